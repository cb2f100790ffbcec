//! Plain vector-backed buffer

use super::{Buffer, ContainerElement, PushType};

/// Dequeued slots are reclaimed once the dead prefix reaches this size and
/// covers at least half of the vector.
const COMPACT_THRESHOLD: usize = 32;

/// Vector buffer with a lazily compacted front offset
///
/// `dequeue` only advances an offset; the dead prefix is drained once it
/// dominates the vector, which keeps dequeue amortized O(1).
#[derive(Debug, Clone)]
pub struct ArrayBuffer<T> {
    items: Vec<T>,
    head: usize,
}

impl<T> Default for ArrayBuffer<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            head: 0,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ArrayBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live items as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.items[self.head..]
    }

    fn maybe_compact(&mut self) {
        if self.head >= COMPACT_THRESHOLD && self.head * 2 >= self.items.len() {
            self.items.drain(..self.head);
            self.head = 0;
        }
    }
}

impl<T> From<Vec<T>> for ArrayBuffer<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items, head: 0 }
    }
}

impl<T: Clone + Send + Sync + 'static> Buffer<T> for ArrayBuffer<T> {
    fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
    }

    fn filter(&mut self, predicate: &mut dyn FnMut(&T, usize) -> bool) {
        self.items.drain(..self.head);
        self.head = 0;
        let mut index = 0;
        self.items.retain(|item| {
            let keep = predicate(item, index);
            index += 1;
            keep
        });
    }

    fn replace(&mut self, items: Vec<T>) -> ContainerElement<T> {
        let removed = std::mem::replace(&mut self.items, items).split_off(self.head);
        self.head = 0;
        ContainerElement {
            add: Some(self.items.clone()),
            remove: Some(removed),
            ..ContainerElement::default()
        }
    }

    fn push(&mut self, item: T) -> PushType {
        self.items.push(item);
        PushType::Added
    }

    fn pop(&mut self) -> Option<T> {
        if self.size() == 0 {
            return None;
        }
        let item = self.items.pop();
        if self.head == self.items.len() {
            self.clear();
        }
        item
    }

    fn pop_size(&mut self, size: usize) -> Vec<T> {
        let size = size.min(self.size());
        let start = self.items.len() - size;
        let popped = self.items.split_off(start);
        if self.head == self.items.len() {
            self.clear();
        }
        popped
    }

    fn dequeue(&mut self) -> Option<T> {
        let item = self.items.get(self.head).cloned()?;
        self.head += 1;
        if self.head == self.items.len() {
            self.clear();
        } else {
            self.maybe_compact();
        }
        Some(item)
    }

    fn dequeue_size(&mut self, size: usize) -> Vec<T> {
        let size = size.min(self.size());
        let dequeued = self.items[self.head..self.head + size].to_vec();
        self.head += size;
        if self.head == self.items.len() {
            self.clear();
        } else {
            self.maybe_compact();
        }
        dequeued
    }

    fn size(&self) -> usize {
        self.items.len() - self.head
    }

    fn to_array(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }
}
