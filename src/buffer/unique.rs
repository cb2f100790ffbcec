//! Insertion-ordered buffer keyed by a unique id

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use super::{Buffer, ContainerElement, IdLookup, PushType};

const COMPACT_THRESHOLD: usize = 32;

/// Vector buffer with an id index
///
/// The index maps each id to its absolute slot in `items`. Dequeue advances
/// `head` and the dead prefix is drained (and the index rebuilt) once it
/// dominates the vector.
pub struct UniqueArrayBuffer<T, K> {
    items: Vec<T>,
    head: usize,
    index: HashMap<K, usize>,
    id_of: IdLookup<T, K>,
}

impl<T: Clone, K: Clone> Clone for UniqueArrayBuffer<T, K> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            head: self.head,
            index: self.index.clone(),
            id_of: self.id_of.clone(),
        }
    }
}

impl<T: fmt::Debug, K> fmt::Debug for UniqueArrayBuffer<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.items[self.head..]).finish()
    }
}

impl<T, K> UniqueArrayBuffer<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(id_of: IdLookup<T, K>) -> Self {
        Self {
            items: Vec::new(),
            head: 0,
            index: HashMap::new(),
            id_of,
        }
    }

    /// True when an item with the same id is stored
    pub fn has(&self, item: &T) -> bool {
        self.index.contains_key(&(self.id_of)(item))
    }

    pub fn get(&self, id: &K) -> Option<&T> {
        self.index.get(id).map(|&slot| &self.items[slot])
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[self.head..]
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (slot, item) in self.items.iter().enumerate() {
            self.index.insert((self.id_of)(item), slot);
        }
    }

    fn drain_dead_prefix(&mut self) {
        if self.head > 0 {
            self.items.drain(..self.head);
            self.head = 0;
            self.reindex();
        }
    }

    fn after_dequeue(&mut self) {
        if self.head == self.items.len() {
            self.clear();
        } else if self.head >= COMPACT_THRESHOLD && self.head * 2 >= self.items.len() {
            self.drain_dead_prefix();
        }
    }

    /// Collapse repeated ids, keeping the first position and the last value
    fn dedupe(&self, items: Vec<T>) -> (Vec<T>, HashMap<K, usize>) {
        let mut unique: Vec<T> = Vec::with_capacity(items.len());
        let mut index = HashMap::with_capacity(items.len());
        for item in items {
            let id = (self.id_of)(&item);
            match index.get(&id) {
                Some(&slot) => unique[slot] = item,
                None => {
                    index.insert(id, unique.len());
                    unique.push(item);
                }
            }
        }
        (unique, index)
    }
}

impl<T, K> Buffer<T> for UniqueArrayBuffer<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
        self.head = 0;
    }

    fn filter(&mut self, predicate: &mut dyn FnMut(&T, usize) -> bool) {
        self.items.drain(..self.head);
        self.head = 0;
        let mut position = 0;
        self.items.retain(|item| {
            let keep = predicate(item, position);
            position += 1;
            keep
        });
        self.reindex();
    }

    fn replace(&mut self, items: Vec<T>) -> ContainerElement<T> {
        let (items, index) = self.dedupe(items);

        let remove: Vec<T> = self
            .as_slice()
            .iter()
            .filter(|old| !index.contains_key(&(self.id_of)(*old)))
            .cloned()
            .collect();
        let (update, add): (Vec<T>, Vec<T>) = items
            .iter()
            .cloned()
            .partition(|new| self.index.contains_key(&(self.id_of)(new)));

        self.items = items;
        self.index = index;
        self.head = 0;

        ContainerElement {
            add: Some(add),
            remove: Some(remove),
            update: Some(update),
            add_index: None,
        }
    }

    fn push(&mut self, item: T) -> PushType {
        let id = (self.id_of)(&item);
        match self.index.get(&id) {
            Some(&slot) => {
                self.items[slot] = item;
                PushType::Updated
            }
            None => {
                self.index.insert(id, self.items.len());
                self.items.push(item);
                PushType::Added
            }
        }
    }

    fn pop(&mut self) -> Option<T> {
        if self.size() == 0 {
            return None;
        }
        let item = self.items.pop()?;
        self.index.remove(&(self.id_of)(&item));
        if self.head == self.items.len() {
            self.clear();
        }
        Some(item)
    }

    fn pop_size(&mut self, size: usize) -> Vec<T> {
        let size = size.min(self.size());
        let popped = self.items.split_off(self.items.len() - size);
        for item in &popped {
            self.index.remove(&(self.id_of)(item));
        }
        if self.head == self.items.len() {
            self.clear();
        }
        popped
    }

    fn dequeue(&mut self) -> Option<T> {
        let item = self.items.get(self.head).cloned()?;
        self.index.remove(&(self.id_of)(&item));
        self.head += 1;
        self.after_dequeue();
        Some(item)
    }

    fn dequeue_size(&mut self, size: usize) -> Vec<T> {
        let size = size.min(self.size());
        let dequeued = self.items[self.head..self.head + size].to_vec();
        for item in &dequeued {
            self.index.remove(&(self.id_of)(item));
        }
        self.head += size;
        self.after_dequeue();
        dequeued
    }

    fn size(&self) -> usize {
        self.items.len() - self.head
    }

    fn to_array(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::testing::check_fifo_contract;

    #[derive(Debug, Clone, PartialEq)]
    struct Quote {
        symbol: &'static str,
        price: u32,
    }

    fn quote(symbol: &'static str, price: u32) -> Quote {
        Quote { symbol, price }
    }

    fn buffer() -> UniqueArrayBuffer<Quote, &'static str> {
        UniqueArrayBuffer::new(Arc::new(|q: &Quote| q.symbol))
    }

    #[test]
    fn test_contract() {
        check_fifo_contract(UniqueArrayBuffer::new(Arc::new(|n: &u32| *n)));
    }

    #[test]
    fn test_push_existing_id_updates_in_place() {
        let mut buffer = buffer();
        assert_eq!(buffer.push(quote("AAA", 1)), PushType::Added);
        assert_eq!(buffer.push(quote("BBB", 2)), PushType::Added);
        assert_eq!(buffer.push(quote("AAA", 3)), PushType::Updated);

        assert_eq!(buffer.size(), 2);
        assert_eq!(buffer.to_array(), vec![quote("AAA", 3), quote("BBB", 2)]);
    }

    #[test]
    fn test_dequeued_id_can_be_added_again() {
        let mut buffer = buffer();
        buffer.push(quote("AAA", 1));
        buffer.push(quote("BBB", 2));
        assert_eq!(buffer.dequeue(), Some(quote("AAA", 1)));
        assert!(!buffer.has(&quote("AAA", 0)));
        assert_eq!(buffer.push(quote("AAA", 5)), PushType::Added);
        assert_eq!(buffer.to_array(), vec![quote("BBB", 2), quote("AAA", 5)]);
    }

    #[test]
    fn test_index_survives_compaction() {
        let mut buffer = UniqueArrayBuffer::new(Arc::new(|n: &u32| *n));
        for i in 0..80u32 {
            buffer.push(i);
        }
        assert_eq!(buffer.dequeue_size(50).len(), 50);
        assert_eq!(buffer.push(70), PushType::Updated);
        assert_eq!(buffer.push(10), PushType::Added);
        assert_eq!(buffer.size(), 31);
        assert_eq!(buffer.get(&70), Some(&70));
    }

    #[test]
    fn test_replace_partitions_by_id() {
        let mut buffer = buffer();
        buffer.push(quote("AAA", 1));
        buffer.push(quote("BBB", 2));

        let diff = buffer.replace(vec![quote("BBB", 20), quote("CCC", 30)]);

        assert_eq!(diff.add, Some(vec![quote("CCC", 30)]));
        assert_eq!(diff.remove, Some(vec![quote("AAA", 1)]));
        assert_eq!(diff.update, Some(vec![quote("BBB", 20)]));
        assert_eq!(buffer.to_array(), vec![quote("BBB", 20), quote("CCC", 30)]);
    }

    #[test]
    fn test_replace_collapses_duplicate_ids() {
        let mut buffer = buffer();
        let diff = buffer.replace(vec![quote("AAA", 1), quote("BBB", 2), quote("AAA", 3)]);
        assert_eq!(diff.add_len(), 2);
        assert_eq!(buffer.to_array(), vec![quote("AAA", 3), quote("BBB", 2)]);
    }

    #[test]
    fn test_filter_rebuilds_index() {
        let mut buffer = buffer();
        buffer.push(quote("AAA", 1));
        buffer.push(quote("BBB", 2));
        buffer.push(quote("CCC", 3));
        buffer.filter(&mut |q, _| q.price != 2);
        assert!(!buffer.has(&quote("BBB", 0)));
        assert_eq!(buffer.push(quote("CCC", 9)), PushType::Updated);
        assert_eq!(buffer.to_array(), vec![quote("AAA", 1), quote("CCC", 9)]);
    }
}
