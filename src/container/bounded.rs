//! Size-bounded container over a buffer strategy

use std::marker::PhantomData;

use crate::buffer::{Buffer, ContainerElement, PushType};

use super::config::ContainerConfig;

/// A buffer with a maximum size
///
/// Every write reports what it changed as a [`ContainerElement`]. When a write
/// takes the buffer past `max_queue_size`, the oldest items are evicted and
/// reported under `remove`.
pub struct Container<T, B> {
    buffer: B,
    max_queue_size: usize,
    _item: PhantomData<fn() -> T>,
}

impl<T, B: Clone> Clone for Container<T, B> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            max_queue_size: self.max_queue_size,
            _item: PhantomData,
        }
    }
}

impl<T, B: std::fmt::Debug> std::fmt::Debug for Container<T, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("buffer", &self.buffer)
            .field("max_queue_size", &self.max_queue_size)
            .finish()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

impl<T, B> Container<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    pub fn new(buffer: B, config: &ContainerConfig) -> Self {
        Self {
            buffer,
            max_queue_size: config.max_queue_size,
            _item: PhantomData,
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Remove everything; the diff lists every removed item
    pub fn clear(&mut self) -> ContainerElement<T> {
        let removed = self.buffer.to_array();
        self.buffer.clear();
        ContainerElement::removed(removed)
    }

    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn to_array(&self) -> Vec<T> {
        self.buffer.to_array()
    }

    fn evict_overflow(&mut self) -> Vec<T> {
        let overflow = self.buffer.size().saturating_sub(self.max_queue_size);
        self.buffer.dequeue_size(overflow)
    }

    /// Append items, then evict the oldest down to the bound
    pub fn push_items(&mut self, items: Vec<T>) -> ContainerElement<T> {
        for item in &items {
            self.buffer.push(item.clone());
        }
        let evicted = self.evict_overflow();
        ContainerElement {
            add: Some(items),
            add_index: Some(0),
            remove: non_empty(evicted),
            update: None,
        }
    }

    pub fn push(&mut self, item: T) -> ContainerElement<T> {
        self.push_items(vec![item])
    }

    pub fn pop(&mut self) -> Option<T> {
        self.buffer.pop()
    }

    pub fn dequeue(&mut self) -> Option<T> {
        self.buffer.dequeue()
    }

    /// Push items one by one, separating new ids from overwritten ones
    pub fn update_items(&mut self, items: Vec<T>) -> ContainerElement<T> {
        let mut add = Vec::new();
        let mut update = Vec::new();
        for item in items {
            match self.buffer.push(item.clone()) {
                PushType::Added => add.push(item),
                PushType::Updated => update.push(item),
            }
        }
        let evicted = self.evict_overflow();
        ContainerElement {
            add: Some(add),
            add_index: None,
            remove: non_empty(evicted),
            update: Some(update),
        }
    }

    /// Swap the whole content and report the buffer's diff
    pub fn replace(&mut self, items: Vec<T>) -> ContainerElement<T> {
        self.buffer.replace(items)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::{ArrayBuffer, UniqueArrayBuffer};

    fn bounded(max: usize) -> Container<u32, ArrayBuffer<u32>> {
        Container::new(ArrayBuffer::new(), &ContainerConfig::new().max_queue_size(max))
    }

    #[test]
    fn test_push_items_without_overflow() {
        let mut container = bounded(5);
        let diff = container.push_items(vec![1, 2]);
        assert_eq!(diff.add, Some(vec![1, 2]));
        assert_eq!(diff.add_index, Some(0));
        assert_eq!(diff.remove, None);
    }

    #[test]
    fn test_push_items_evicts_oldest() {
        let mut container = bounded(3);
        container.push_items(vec![1, 2]);
        let diff = container.push_items(vec![3, 4, 5]);

        assert_eq!(diff.remove, Some(vec![1, 2]));
        assert_eq!(container.to_array(), vec![3, 4, 5]);
    }

    #[test]
    fn test_size_never_exceeds_bound() {
        let mut container = bounded(4);
        for batch in [vec![1], vec![2, 3, 4, 5, 6, 7], vec![8, 9]] {
            container.push_items(batch);
            assert!(container.size() <= 4);
        }
        assert_eq!(container.to_array(), vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_update_items_separates_added_and_updated() {
        let mut container = Container::new(
            UniqueArrayBuffer::new(Arc::new(|pair: &(u32, u32)| pair.0)),
            &ContainerConfig::new().max_queue_size(2),
        );
        container.push((1, 0));

        let diff = container.update_items(vec![(1, 10), (2, 20), (3, 30)]);

        assert_eq!(diff.update, Some(vec![(1, 10)]));
        assert_eq!(diff.add, Some(vec![(2, 20), (3, 30)]));
        assert_eq!(diff.remove, Some(vec![(1, 10)]));
        assert_eq!(container.to_array(), vec![(2, 20), (3, 30)]);
    }

    #[test]
    fn test_clear_reports_removed() {
        let mut container = bounded(10);
        container.push_items(vec![1, 2]);
        let diff = container.clear();
        assert_eq!(diff.remove, Some(vec![1, 2]));
        assert!(container.is_empty());
    }
}
