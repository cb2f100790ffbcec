//! Container that publishes its transactions

use std::sync::{Arc, Mutex, Weak};

use crate::buffer::{Buffer, ContainerElement};
use crate::subscribable::{
    lock, ExtendedSubscription, Lifecycle, Subscribable, SubscribableEvent,
};

use super::config::ContainerConfig;
use super::stateful::{StatefulContainer, Status, Transaction, TransactionKind};
use super::upstream::{Activation, Resolver, UpstreamHandler};

/// Events dispatched by a [`SubscriberContainer`]
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerEvent<T> {
    /// Everything was removed
    Clear(ContainerElement<T>),
    /// A write reached the running container
    Update(ContainerElement<T>),
    /// A write was queued while paused
    Queued(ContainerElement<T>),
    Paused,
    Resumed,
}

impl<T: Clone + Send + Sync + 'static> SubscribableEvent for ContainerEvent<T> {
    fn event_type(&self) -> &'static str {
        match self {
            ContainerEvent::Clear(_) => "clear",
            ContainerEvent::Update(_) => "update",
            ContainerEvent::Queued(_) => "queued",
            ContainerEvent::Paused => "paused",
            ContainerEvent::Resumed => "resumed",
        }
    }
}

impl<T> From<Transaction<T>> for ContainerEvent<T> {
    fn from(transaction: Transaction<T>) -> Self {
        match transaction.kind {
            TransactionKind::Update => ContainerEvent::Update(transaction.element),
            TransactionKind::Queued => ContainerEvent::Queued(transaction.element),
        }
    }
}

struct Inner<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    subscribable: Subscribable<ContainerEvent<T>>,
    container: Mutex<StatefulContainer<T, B>>,
    activation: Mutex<Option<Arc<Activation<SubscriberContainer<T, B>>>>>,
}

/// A [`StatefulContainer`] behind a subscribable
///
/// This is a cheap handle; clones share the same container. Every mutation
/// dispatches the resulting transaction after the internal lock is released.
pub struct SubscriberContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    inner: Arc<Inner<T, B>>,
}

impl<T, B> Clone for SubscriberContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, B> SubscriberContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    pub fn new(buffer: B, config: &ContainerConfig) -> Self {
        Self::from_stateful(StatefulContainer::new(buffer, config))
    }

    /// Use a separate buffer for the pause queue
    pub fn with_queue(running: B, queued: B, config: &ContainerConfig) -> Self {
        Self::from_stateful(StatefulContainer::with_queue(running, queued, config))
    }

    fn from_stateful(container: StatefulContainer<T, B>) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribable: Subscribable::new("SubscriberContainer"),
                container: Mutex::new(container),
                activation: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to every event; the extension is a handle to this container
    pub fn subscribe<F>(&self, callback: F) -> ExtendedSubscription<ContainerEvent<T>, Self>
    where
        F: Fn(&ContainerEvent<T>) + Send + Sync + 'static,
    {
        self.inner
            .subscribable
            .subscribe_extended(callback, None, None, |_| self.clone())
    }

    /// Subscribe to events whose discriminant is in `types`
    pub fn subscribe_filtered<F>(
        &self,
        callback: F,
        types: &[&'static str],
    ) -> ExtendedSubscription<ContainerEvent<T>, Self>
    where
        F: Fn(&ContainerEvent<T>) + Send + Sync + 'static,
    {
        self.inner
            .subscribable
            .subscribe_extended(callback, None, Some(types), |_| self.clone())
    }

    pub fn subscribable(&self) -> &Subscribable<ContainerEvent<T>> {
        &self.inner.subscribable
    }

    fn publish(&self, transaction: Transaction<T>) {
        self.inner.subscribable.dispatch(transaction.into());
    }

    pub fn pause(&self) {
        lock(&self.inner.container).pause();
        self.inner.subscribable.dispatch(ContainerEvent::Paused);
    }

    /// Resume and publish the merge if it added or removed items
    pub fn resume(&self) {
        let transaction = lock(&self.inner.container).resume();
        self.inner.subscribable.dispatch(ContainerEvent::Resumed);
        let element = &transaction.element;
        if element.add_len() > 0 || element.remove_len() > 0 {
            self.publish(transaction);
        }
    }

    pub fn clear(&self) {
        let removed = lock(&self.inner.container).clear();
        let activation = lock(&self.inner.activation).clone();
        if let Some(activation) = activation {
            activation.cleared(self);
        }
        self.inner.subscribable.dispatch(ContainerEvent::Clear(removed));
    }

    pub fn status(&self) -> Status {
        lock(&self.inner.container).status()
    }

    pub fn buffered_items(&self) -> Vec<T> {
        lock(&self.inner.container).buffered_items()
    }

    pub fn buffered_items_len(&self) -> usize {
        lock(&self.inner.container).buffered_items_len()
    }

    pub fn queued_items(&self) -> Vec<T> {
        lock(&self.inner.container).queued_items()
    }

    pub fn queued_items_len(&self) -> usize {
        lock(&self.inner.container).queued_items_len()
    }

    pub fn push_items(&self, items: Vec<T>) {
        let transaction = lock(&self.inner.container).push_items(items);
        self.publish(transaction);
    }

    pub fn push(&self, item: T) {
        self.push_items(vec![item]);
    }

    pub fn replace(&self, items: Vec<T>) {
        let transaction = lock(&self.inner.container).replace(items);
        self.publish(transaction);
    }

    /// Merge items by id, publish and return the transaction
    pub fn update_items(&self, items: Vec<T>) -> Transaction<T> {
        let transaction = lock(&self.inner.container).update_items(items);
        self.publish(transaction.clone());
        transaction
    }

    /// Feed this container from `upstream` while it has subscribers
    pub(crate) fn attach_upstream<U, H>(&self, upstream: Subscribable<U>, handler: H)
    where
        U: SubscribableEvent,
        H: UpstreamHandler<U, Self>,
    {
        let weak: Weak<Inner<T, B>> = Arc::downgrade(&self.inner);
        let resolve: Resolver<Self> = Arc::new(move || weak.upgrade().map(|inner| Self { inner }));
        let activation = Arc::new(Activation::new(upstream, handler, resolve));

        let hooks: Weak<dyn Lifecycle> = Arc::downgrade(&activation) as Weak<dyn Lifecycle>;
        self.inner.subscribable.set_lifecycle(hooks);
        let previous = lock(&self.inner.activation).replace(Arc::clone(&activation));
        drop(previous);

        if self.inner.subscribable.has_subscribers() {
            activation.on_first_subscription(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ArrayBuffer;

    type Events = Arc<Mutex<Vec<ContainerEvent<u32>>>>;

    fn container() -> SubscriberContainer<u32, ArrayBuffer<u32>> {
        SubscriberContainer::new(ArrayBuffer::new(), &ContainerConfig::default())
    }

    fn record(
        container: &SubscriberContainer<u32, ArrayBuffer<u32>>,
    ) -> (
        Events,
        ExtendedSubscription<ContainerEvent<u32>, SubscriberContainer<u32, ArrayBuffer<u32>>>,
    ) {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = container.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        (events, subscription)
    }

    fn types(events: &Events) -> Vec<&'static str> {
        events.lock().unwrap().iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn test_writes_dispatch_update() {
        let container = container();
        let (events, _sub) = record(&container);

        container.push(1);
        container.push_items(vec![2, 3]);

        assert_eq!(types(&events), vec!["update", "update"]);
        assert_eq!(container.buffered_items(), vec![1, 2, 3]);
    }

    #[test]
    fn test_pause_queue_resume() {
        let container = container();
        let (events, handle) = record(&container);

        handle.pause();
        container.push(1);
        assert_eq!(container.queued_items(), vec![1]);
        handle.resume();

        assert_eq!(types(&events), vec!["paused", "queued", "resumed", "update"]);
        let events = events.lock().unwrap();
        assert_eq!(
            events[3],
            ContainerEvent::Update(ContainerElement {
                add: Some(vec![1]),
                add_index: None,
                remove: None,
                update: Some(vec![]),
            })
        );
    }

    #[test]
    fn test_resume_with_empty_queue_only_reports_resumed() {
        let container = container();
        let (events, _sub) = record(&container);

        container.pause();
        container.resume();

        assert_eq!(types(&events), vec!["paused", "resumed"]);
    }

    #[test]
    fn test_resume_skips_update_only_merge() {
        use crate::buffer::UniqueArrayBuffer;

        let container = SubscriberContainer::new(
            UniqueArrayBuffer::new(Arc::new(|item: &(u32, u32)| item.0)),
            &ContainerConfig::default(),
        );
        container.push((1, 10));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _sub = container.subscribe(move |e| sink.lock().unwrap().push(e.event_type()));

        container.pause();
        container.push((1, 11));
        container.resume();

        assert_eq!(*events.lock().unwrap(), vec!["paused", "queued", "resumed"]);
        assert_eq!(container.buffered_items(), vec![(1, 11)]);
    }

    #[test]
    fn test_clear_dispatches_removed_items() {
        let container = container();
        container.push_items(vec![1, 2]);
        let (events, _sub) = record(&container);

        container.clear();

        assert_eq!(
            *events.lock().unwrap(),
            vec![ContainerEvent::Clear(ContainerElement::removed(vec![1, 2]))]
        );
    }

    #[test]
    fn test_filtered_subscription() {
        let container = container();
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _sub = container.subscribe_filtered(
            move |e| sink.lock().unwrap().push(e.clone()),
            &["paused", "resumed"],
        );

        container.push(1);
        container.pause();
        container.push(2);
        container.resume();

        assert_eq!(types(&events), vec!["paused", "resumed"]);
    }

    #[test]
    fn test_update_items_returns_transaction() {
        let container = container();
        container.pause();
        let transaction = container.update_items(vec![4]);
        assert_eq!(transaction.kind, TransactionKind::Queued);
        assert_eq!(container.status(), Status::Paused);
    }
}
