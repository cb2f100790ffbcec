//! Buffer strategies
//!
//! A [`Buffer`] is the storage behind every container. All four strategies
//! expose the same operation set so containers can be parameterised over
//! them:
//!
//! | Strategy | push | dequeue | replace | uniqueness / order |
//! |---|---|---|---|---|
//! | [`ArrayBuffer`] | O(1) | O(1) amortized | O(n) | none |
//! | [`LinkListBuffer`] | O(1) | O(1) | O(n) | none |
//! | [`UniqueArrayBuffer`] | O(1) | O(1) amortized | O(n) | unique id, insertion order |
//! | [`UniqueSortedArrayBuffer`] | O(log n) + shift | O(n) shift | O(n log n) | unique id, sorted |
//!
//! `replace` swaps the full content and reports what changed as a
//! [`ContainerElement`]. Plain buffers report everything old as removed and
//! everything new as added; unique buffers partition by id into add,
//! remove and update.

pub mod array;
pub mod link_list;
pub mod unique;
pub mod unique_sorted;

use std::cmp::Ordering;
use std::sync::Arc;

pub use array::ArrayBuffer;
pub use link_list::LinkListBuffer;
pub use unique::UniqueArrayBuffer;
pub use unique_sorted::UniqueSortedArrayBuffer;

/// Extracts the unique id of an item
pub type IdLookup<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Total order used by [`UniqueSortedArrayBuffer`]
pub type Compare<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Outcome of [`Buffer::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushType {
    /// The item was not present before
    Added,
    /// An item with the same unique id was overwritten
    Updated,
}

/// Diff produced by one buffer or container mutation
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerElement<T> {
    /// Items that were not present before
    pub add: Option<Vec<T>>,
    /// Position hint for `add`
    pub add_index: Option<usize>,
    /// Items that were present before and are gone now
    pub remove: Option<Vec<T>>,
    /// Items whose identity was kept but whose content was replaced
    pub update: Option<Vec<T>>,
}

impl<T> Default for ContainerElement<T> {
    fn default() -> Self {
        Self {
            add: None,
            add_index: None,
            remove: None,
            update: None,
        }
    }
}

impl<T> ContainerElement<T> {
    /// A diff that only adds
    pub fn added(items: Vec<T>) -> Self {
        Self {
            add: Some(items),
            ..Self::default()
        }
    }

    /// A diff that only removes
    pub fn removed(items: Vec<T>) -> Self {
        Self {
            remove: Some(items),
            ..Self::default()
        }
    }

    pub fn add_len(&self) -> usize {
        self.add.as_ref().map_or(0, Vec::len)
    }

    pub fn remove_len(&self) -> usize {
        self.remove.as_ref().map_or(0, Vec::len)
    }

    pub fn update_len(&self) -> usize {
        self.update.as_ref().map_or(0, Vec::len)
    }

    /// True when nothing was added, removed or updated
    pub fn is_empty(&self) -> bool {
        self.add_len() == 0 && self.remove_len() == 0 && self.update_len() == 0
    }
}

/// Storage strategy behind a container
///
/// `pop` works on the back and `dequeue` on the front. Size arguments are
/// clamped to the available number of items.
pub trait Buffer<T>: Clone + Send + Sync + 'static {
    /// Remove every item
    fn clear(&mut self);

    /// Keep only the items for which `predicate(item, index)` holds,
    /// preserving their relative order
    fn filter(&mut self, predicate: &mut dyn FnMut(&T, usize) -> bool);

    /// Swap in `items` as the full content and report the diff
    fn replace(&mut self, items: Vec<T>) -> ContainerElement<T>;

    /// Swap in the content of another buffer and report the diff
    fn replace_with<B: Buffer<T>>(&mut self, other: &B) -> ContainerElement<T>
    where
        Self: Sized,
    {
        self.replace(other.to_array())
    }

    /// Append an item, or overwrite the item with the same id
    fn push(&mut self, item: T) -> PushType;

    /// Remove the last item
    fn pop(&mut self) -> Option<T>;

    /// Remove up to `size` items from the back, returned in buffer order
    fn pop_size(&mut self, size: usize) -> Vec<T>;

    /// Remove the first item
    fn dequeue(&mut self) -> Option<T>;

    /// Remove up to `size` items from the front, returned in buffer order
    fn dequeue_size(&mut self, size: usize) -> Vec<T>;

    /// Number of items, O(1)
    fn size(&self) -> usize;

    /// Snapshot of the items in logical order
    fn to_array(&self) -> Vec<T>;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
