//! Doubly-linked list buffer
//!
//! Nodes live in an arena (`Vec` of slots plus a free list) and link to each
//! other by index, which keeps the structure in safe code and reuses slots
//! freed by `pop`/`dequeue`/`filter`.

use super::{Buffer, ContainerElement, PushType};

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Linked list with O(1) push, pop and dequeue
#[derive(Debug, Clone)]
pub struct LinkListBuffer<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for LinkListBuffer<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }
}

/// Front-to-back iterator over a [`LinkListBuffer`]
pub struct Iter<'a, T> {
    list: &'a LinkListBuffer<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let node = self.list.node(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.value)
    }
}

impl<T> LinkListBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn node(&self, index: usize) -> Option<&Node<T>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut Node<T>> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    fn alloc(&mut self, node: Node<T>) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                index
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn unlink(&mut self, index: usize) -> Option<T> {
        let node = self.slots.get_mut(index)?.take()?;
        self.free.push(index);

        match node.prev {
            Some(prev) => {
                if let Some(p) = self.node_mut(prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.node_mut(next) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.len -= 1;
        if self.len == 0 {
            self.slots.clear();
            self.free.clear();
        }
        Some(node.value)
    }
}

impl<T: Clone + Send + Sync + 'static> Buffer<T> for LinkListBuffer<T> {
    fn clear(&mut self) {
        *self = Self::default();
    }

    fn filter(&mut self, predicate: &mut dyn FnMut(&T, usize) -> bool) {
        let mut cursor = self.head;
        let mut index = 0;
        while let Some(current) = cursor {
            let Some(node) = self.node(current) else {
                break;
            };
            cursor = node.next;
            if !predicate(&node.value, index) {
                self.unlink(current);
            }
            index += 1;
        }
    }

    fn replace(&mut self, items: Vec<T>) -> ContainerElement<T> {
        let removed = self.to_array();
        self.clear();
        for item in &items {
            self.push(item.clone());
        }
        ContainerElement {
            add: Some(items),
            remove: Some(removed),
            ..ContainerElement::default()
        }
    }

    fn push(&mut self, item: T) -> PushType {
        let index = self.alloc(Node {
            value: item,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => {
                if let Some(t) = self.node_mut(tail) {
                    t.next = Some(index);
                }
            }
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        PushType::Added
    }

    fn pop(&mut self) -> Option<T> {
        self.unlink(self.tail?)
    }

    fn pop_size(&mut self, size: usize) -> Vec<T> {
        let mut popped: Vec<T> = std::iter::from_fn(|| self.pop()).take(size).collect();
        popped.reverse();
        popped
    }

    fn dequeue(&mut self) -> Option<T> {
        self.unlink(self.head?)
    }

    fn dequeue_size(&mut self, size: usize) -> Vec<T> {
        std::iter::from_fn(|| self.dequeue()).take(size).collect()
    }

    fn size(&self) -> usize {
        self.len
    }

    fn to_array(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
