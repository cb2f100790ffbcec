//! Sorted buffer keyed by a unique id

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use super::{Buffer, Compare, ContainerElement, IdLookup, PushType};

/// Vector kept sorted by `compare`, at most one item per id
///
/// `stored` mirrors the current value for each id so a re-push can find the
/// old slot even when the new value sorts elsewhere. Items that compare
/// equal keep their insertion order.
pub struct UniqueSortedArrayBuffer<T, K> {
    items: Vec<T>,
    stored: HashMap<K, T>,
    compare: Compare<T>,
    id_of: IdLookup<T, K>,
}

impl<T: Clone, K: Clone> Clone for UniqueSortedArrayBuffer<T, K> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            stored: self.stored.clone(),
            compare: self.compare.clone(),
            id_of: self.id_of.clone(),
        }
    }
}

impl<T: fmt::Debug, K> fmt::Debug for UniqueSortedArrayBuffer<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.items).finish()
    }
}

impl<T, K> UniqueSortedArrayBuffer<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(compare: Compare<T>, id_of: IdLookup<T, K>) -> Self {
        Self {
            items: Vec::new(),
            stored: HashMap::new(),
            compare,
            id_of,
        }
    }

    pub fn has(&self, item: &T) -> bool {
        self.stored.contains_key(&(self.id_of)(item))
    }

    pub fn get(&self, id: &K) -> Option<&T> {
        self.stored.get(id)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Remove the item with the same id; false when absent
    pub fn delete(&mut self, item: &T) -> bool {
        let id = (self.id_of)(item);
        let Some(old) = self.stored.remove(&id) else {
            return false;
        };
        if let Some(slot) = self.locate(&old, &id) {
            self.items.remove(slot);
        }
        true
    }

    /// Slot holding `value` with the given id
    fn locate(&self, value: &T, id: &K) -> Option<usize> {
        let start = self
            .items
            .partition_point(|probe| (self.compare)(probe, value) == Ordering::Less);
        self.items[start..]
            .iter()
            .take_while(|probe| (self.compare)(*probe, value) == Ordering::Equal)
            .position(|probe| (self.id_of)(probe) == *id)
            .map(|offset| start + offset)
            .or_else(|| self.items.iter().position(|probe| (self.id_of)(probe) == *id))
    }

    /// Slot after the run of items comparing equal to `value`
    fn insertion_point(&self, value: &T) -> usize {
        self.items
            .partition_point(|probe| (self.compare)(probe, value) != Ordering::Greater)
    }

    fn insert(&mut self, id: K, item: T) {
        let slot = self.insertion_point(&item);
        self.items.insert(slot, item.clone());
        self.stored.insert(id, item);
    }

    fn forget(&mut self, items: &[T]) {
        for item in items {
            self.stored.remove(&(self.id_of)(item));
        }
    }
}

impl<T, K> Buffer<T> for UniqueSortedArrayBuffer<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn clear(&mut self) {
        self.items.clear();
        self.stored.clear();
    }

    fn filter(&mut self, predicate: &mut dyn FnMut(&T, usize) -> bool) {
        let stored = &mut self.stored;
        let id_of = &self.id_of;
        let mut position = 0;
        self.items.retain(|item| {
            let keep = predicate(item, position);
            position += 1;
            if !keep {
                stored.remove(&id_of(item));
            }
            keep
        });
    }

    fn replace(&mut self, items: Vec<T>) -> ContainerElement<T> {
        let mut incoming: HashMap<K, T> = HashMap::with_capacity(items.len());
        let mut order: Vec<K> = Vec::with_capacity(items.len());
        for item in items {
            let id = (self.id_of)(&item);
            if incoming.insert(id.clone(), item).is_none() {
                order.push(id);
            }
        }

        let remove: Vec<T> = self
            .items
            .iter()
            .filter(|old| !incoming.contains_key(&(self.id_of)(*old)))
            .cloned()
            .collect();

        let mut sorted: Vec<T> = order
            .iter()
            .filter_map(|id| incoming.get(id).cloned())
            .collect();
        sorted.sort_by(|a, b| (self.compare)(a, b));

        let (update, add): (Vec<T>, Vec<T>) = sorted
            .iter()
            .cloned()
            .partition(|new| self.stored.contains_key(&(self.id_of)(new)));

        self.items = sorted;
        self.stored = incoming;

        ContainerElement {
            add: Some(add),
            remove: Some(remove),
            update: Some(update),
            add_index: None,
        }
    }

    fn push(&mut self, item: T) -> PushType {
        let id = (self.id_of)(&item);
        let Some(old) = self.stored.get(&id).cloned() else {
            self.insert(id, item);
            return PushType::Added;
        };

        match self.locate(&old, &id) {
            Some(slot) if (self.compare)(&old, &item) == Ordering::Equal => {
                self.items[slot] = item.clone();
                self.stored.insert(id, item);
            }
            Some(slot) => {
                self.items.remove(slot);
                self.insert(id, item);
            }
            None => self.insert(id, item),
        }
        PushType::Updated
    }

    fn pop(&mut self) -> Option<T> {
        let item = self.items.pop()?;
        self.stored.remove(&(self.id_of)(&item));
        Some(item)
    }

    fn pop_size(&mut self, size: usize) -> Vec<T> {
        let size = size.min(self.items.len());
        let popped = self.items.split_off(self.items.len() - size);
        self.forget(&popped);
        popped
    }

    fn dequeue(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items.remove(0);
        self.stored.remove(&(self.id_of)(&item));
        Some(item)
    }

    fn dequeue_size(&mut self, size: usize) -> Vec<T> {
        let size = size.min(self.items.len());
        let dequeued: Vec<T> = self.items.drain(..size).collect();
        self.forget(&dequeued);
        dequeued
    }

    fn size(&self) -> usize {
        self.items.len()
    }

    fn to_array(&self) -> Vec<T> {
        self.items.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::testing::check_fifo_contract;

    #[derive(Debug, Clone, PartialEq)]
    struct Order {
        id: u32,
        price: u32,
    }

    fn order(id: u32, price: u32) -> Order {
        Order { id, price }
    }

    fn book() -> UniqueSortedArrayBuffer<Order, u32> {
        UniqueSortedArrayBuffer::new(
            Arc::new(|a: &Order, b: &Order| a.price.cmp(&b.price)),
            Arc::new(|o: &Order| o.id),
        )
    }

    fn assert_sorted(buffer: &UniqueSortedArrayBuffer<Order, u32>) {
        let prices: Vec<u32> = buffer.as_slice().iter().map(|o| o.price).collect();
        let mut sorted = prices.clone();
        sorted.sort();
        assert_eq!(prices, sorted);
    }

    #[test]
    fn test_contract() {
        check_fifo_contract(UniqueSortedArrayBuffer::new(
            Arc::new(|a: &u32, b: &u32| a.cmp(b)),
            Arc::new(|n: &u32| *n),
        ));
    }

    #[test]
    fn test_push_keeps_order() {
        let mut book = book();
        for (id, price) in [(1, 50), (2, 10), (3, 30), (4, 70), (5, 20)] {
            assert_eq!(book.push(order(id, price)), PushType::Added);
        }
        assert_sorted(&book);
        assert_eq!(book.dequeue(), Some(order(2, 10)));
        assert_eq!(book.pop(), Some(order(4, 70)));
    }

    #[test]
    fn test_repush_moves_item() {
        let mut book = book();
        book.push(order(1, 10));
        book.push(order(2, 20));
        book.push(order(3, 30));

        assert_eq!(book.push(order(1, 40)), PushType::Updated);
        assert_eq!(book.size(), 3);
        assert_sorted(&book);
        assert_eq!(book.as_slice().last(), Some(&order(1, 40)));
    }

    #[test]
    fn test_equal_keys_stay_addressable() {
        let mut book = book();
        book.push(order(1, 10));
        book.push(order(2, 10));
        book.push(order(3, 10));

        assert_eq!(
            book.to_array().iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(book.push(order(2, 10)), PushType::Updated);
        assert!(book.delete(&order(3, 0)));
        assert_eq!(
            book.to_array().iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_delete_is_miss_safe() {
        let mut book = book();
        assert!(!book.delete(&order(1, 10)));
        book.push(order(1, 10));
        assert!(book.has(&order(1, 99)));
        assert!(book.delete(&order(1, 99)));
        assert!(!book.has(&order(1, 10)));
        assert!(book.is_empty());
    }

    #[test]
    fn test_replace_partitions_and_sorts() {
        let mut book = book();
        book.push(order(1, 10));
        book.push(order(2, 20));

        let diff = book.replace(vec![order(3, 5), order(2, 25), order(3, 50)]);

        assert_eq!(diff.add, Some(vec![order(3, 50)]));
        assert_eq!(diff.remove, Some(vec![order(1, 10)]));
        assert_eq!(diff.update, Some(vec![order(2, 25)]));
        assert_eq!(book.to_array(), vec![order(2, 25), order(3, 50)]);
        assert_eq!(book.get(&3), Some(&order(3, 50)));
    }
}
