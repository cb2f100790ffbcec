//! Pausable container
//!
//! A running container holds what subscribers currently see; a queued
//! container collects writes while paused. Resuming folds the queue back in,
//! either as a merge or, when a `replace` happened during the pause, as a
//! wholesale replacement.

use std::fmt;

use crate::buffer::{Buffer, ContainerElement};

use super::bounded::Container;
use super::config::ContainerConfig;

/// Whether writes reach the running container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Paused,
}

impl Status {
    pub fn is_running(self) -> bool {
        self == Status::Running
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Running => write!(f, "running"),
            Status::Paused => write!(f, "paused"),
        }
    }
}

/// Where a write landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Applied to the running container
    Update,
    /// Held in the queue until resume
    Queued,
}

/// A diff tagged with where it was applied
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction<T> {
    pub kind: TransactionKind,
    pub element: ContainerElement<T>,
}

impl<T> Transaction<T> {
    fn update(element: ContainerElement<T>) -> Self {
        Self {
            kind: TransactionKind::Update,
            element,
        }
    }

    fn queued(element: ContainerElement<T>) -> Self {
        Self {
            kind: TransactionKind::Queued,
            element,
        }
    }
}

/// Running plus queued container of the same buffer type
pub struct StatefulContainer<T, B> {
    running: Container<T, B>,
    queued: Container<T, B>,
    status: Status,
    replace_on_resume: bool,
}

impl<T, B> StatefulContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    /// The queue starts as an empty clone of `buffer`
    pub fn new(buffer: B, config: &ContainerConfig) -> Self {
        let mut queued = buffer.clone();
        queued.clear();
        Self::with_queue(buffer, queued, config)
    }

    /// Use a separate buffer for the queue
    pub fn with_queue(running: B, queued: B, config: &ContainerConfig) -> Self {
        Self {
            running: Container::new(running, config),
            queued: Container::new(queued, config),
            status: Status::Running,
            replace_on_resume: false,
        }
    }

    pub fn pause(&mut self) {
        self.status = Status::Paused;
    }

    /// Fold the queue into the running container and start running
    pub fn resume(&mut self) -> Transaction<T> {
        let queued = self.queued.to_array();
        let element = if self.replace_on_resume {
            self.running.replace(queued)
        } else {
            self.running.update_items(queued)
        };
        self.queued.clear();
        self.replace_on_resume = false;
        self.status = Status::Running;
        Transaction::update(element)
    }

    /// Wipe both containers; the diff lists what subscribers held
    pub fn clear(&mut self) -> ContainerElement<T> {
        self.queued.clear();
        self.running.clear()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn buffered_items(&self) -> Vec<T> {
        self.running.to_array()
    }

    pub fn buffered_items_len(&self) -> usize {
        self.running.size()
    }

    pub fn queued_items(&self) -> Vec<T> {
        self.queued.to_array()
    }

    pub fn queued_items_len(&self) -> usize {
        self.queued.size()
    }

    pub fn push_items(&mut self, items: Vec<T>) -> Transaction<T> {
        match self.status {
            Status::Paused => Transaction::queued(self.queued.push_items(items)),
            Status::Running => Transaction::update(self.running.push_items(items)),
        }
    }

    pub fn push(&mut self, item: T) -> Transaction<T> {
        self.push_items(vec![item])
    }

    pub fn update_items(&mut self, items: Vec<T>) -> Transaction<T> {
        match self.status {
            Status::Paused => Transaction::queued(self.queued.update_items(items)),
            Status::Running => Transaction::update(self.running.update_items(items)),
        }
    }

    /// Replace the content
    ///
    /// While paused the queue is first seeded with the running content, so
    /// the reported diff is relative to what subscribers currently hold and
    /// resume replaces instead of merging.
    pub fn replace(&mut self, items: Vec<T>) -> Transaction<T> {
        match self.status {
            Status::Paused => {
                self.replace_on_resume = true;
                self.queued.clear();
                self.queued.push_items(self.running.to_array());
                Transaction::queued(self.queued.replace(items))
            }
            Status::Running => Transaction::update(self.running.replace(items)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::{ArrayBuffer, UniqueArrayBuffer};

    fn stateful() -> StatefulContainer<u32, ArrayBuffer<u32>> {
        StatefulContainer::new(ArrayBuffer::new(), &ContainerConfig::default())
    }

    #[test]
    fn test_writes_follow_status() {
        let mut container = stateful();
        assert_eq!(container.push(1).kind, TransactionKind::Update);

        container.pause();
        assert_eq!(container.status(), Status::Paused);
        assert_eq!(container.push(2).kind, TransactionKind::Queued);
        assert_eq!(container.buffered_items(), vec![1]);
        assert_eq!(container.queued_items(), vec![2]);
    }

    #[test]
    fn test_resume_merges_queue() {
        let mut container = stateful();
        container.push_items(vec![1, 2]);
        container.pause();
        container.push_items(vec![3, 4]);

        let transaction = container.resume();

        assert_eq!(transaction.kind, TransactionKind::Update);
        assert_eq!(transaction.element.add, Some(vec![3, 4]));
        assert_eq!(container.buffered_items(), vec![1, 2, 3, 4]);
        assert_eq!(container.queued_items_len(), 0);
        assert_eq!(container.status(), Status::Running);
    }

    #[test]
    fn test_replace_while_paused_wins_on_resume() {
        let mut container = stateful();
        container.push_items(vec![1, 2]);
        container.pause();

        let queued = container.replace(vec![7, 8]);
        assert_eq!(queued.kind, TransactionKind::Queued);
        assert_eq!(queued.element.remove, Some(vec![1, 2]));

        container.push(9);
        let transaction = container.resume();

        assert_eq!(container.buffered_items(), vec![7, 8, 9]);
        assert_eq!(transaction.element.remove, Some(vec![1, 2]));
        assert_eq!(transaction.element.add, Some(vec![7, 8, 9]));
    }

    #[test]
    fn test_replace_flag_resets_after_resume() {
        let mut container = stateful();
        container.pause();
        container.replace(vec![1]);
        container.resume();

        container.pause();
        container.push(2);
        container.resume();
        assert_eq!(container.buffered_items(), vec![1, 2]);
    }

    #[test]
    fn test_merge_matches_direct_writes() {
        let id_of = Arc::new(|pair: &(u32, u32)| pair.0);
        let mut paused = StatefulContainer::new(
            UniqueArrayBuffer::new(id_of.clone()),
            &ContainerConfig::default(),
        );
        let mut direct = StatefulContainer::new(
            UniqueArrayBuffer::new(id_of),
            &ContainerConfig::default(),
        );

        let writes = [vec![(1, 1), (2, 1)], vec![(1, 2)], vec![(3, 1), (2, 2)]];
        paused.pause();
        for batch in &writes {
            paused.update_items(batch.clone());
            direct.update_items(batch.clone());
        }
        paused.resume();

        assert_eq!(paused.buffered_items(), direct.buffered_items());
    }

    #[test]
    fn test_clear_empties_both() {
        let mut container = stateful();
        container.push(1);
        container.pause();
        container.push(2);

        let removed = container.clear();
        assert_eq!(removed.remove, Some(vec![1]));
        assert_eq!(container.buffered_items_len(), 0);
        assert_eq!(container.queued_items_len(), 0);
    }
}
