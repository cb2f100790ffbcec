//! Subscriber container fed by an upstream source

use std::ops::Deref;

use crate::buffer::Buffer;
use crate::subscribable::{Subscribable, SubscribableEvent};

use super::config::ContainerConfig;
use super::subscriber::SubscriberContainer;
use super::upstream::UpstreamHandler;

/// A [`SubscriberContainer`] that subscribes to `upstream` lazily
///
/// The upstream subscription exists only while this container has at least
/// one subscriber. Each upstream event goes to the handler together with the
/// container, and the handler decides which writes to make.
pub struct SubscriptionContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    container: SubscriberContainer<T, B>,
}

impl<T, B> Clone for SubscriptionContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
        }
    }
}

impl<T, B> SubscriptionContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    pub fn new<U, H>(upstream: Subscribable<U>, handler: H, buffer: B, config: &ContainerConfig) -> Self
    where
        U: SubscribableEvent,
        H: UpstreamHandler<U, SubscriberContainer<T, B>>,
    {
        let container = SubscriberContainer::new(buffer, config);
        container.attach_upstream(upstream, handler);
        Self { container }
    }

    /// Like [`new`](Self::new) with a separate buffer for the pause queue
    pub fn with_queue<U, H>(
        upstream: Subscribable<U>,
        handler: H,
        running: B,
        queued: B,
        config: &ContainerConfig,
    ) -> Self
    where
        U: SubscribableEvent,
        H: UpstreamHandler<U, SubscriberContainer<T, B>>,
    {
        let container = SubscriberContainer::with_queue(running, queued, config);
        container.attach_upstream(upstream, handler);
        Self { container }
    }

    /// The underlying container handle
    pub fn container(&self) -> &SubscriberContainer<T, B> {
        &self.container
    }
}

impl<T, B> Deref for SubscriptionContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    type Target = SubscriberContainer<T, B>;

    fn deref(&self) -> &Self::Target {
        &self.container
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::buffer::ArrayBuffer;
    use crate::container::ContainerEvent;

    #[derive(Debug, Clone)]
    enum Feed {
        Price(u32),
        Snapshot(Vec<u32>),
    }

    impl SubscribableEvent for Feed {
        fn event_type(&self) -> &'static str {
            match self {
                Feed::Price(_) => "price",
                Feed::Snapshot(_) => "snapshot",
            }
        }
    }

    fn on_feed(event: &Feed, container: &SubscriberContainer<u32, ArrayBuffer<u32>>) {
        match event {
            Feed::Price(price) => container.push(*price),
            Feed::Snapshot(prices) => container.replace(prices.clone()),
        }
    }

    #[test]
    fn test_upstream_follows_local_subscribers() {
        let upstream: Subscribable<Feed> = Subscribable::new("feed");
        let container = SubscriptionContainer::new(
            upstream.clone(),
            on_feed,
            ArrayBuffer::new(),
            &ContainerConfig::default(),
        );
        assert!(!upstream.has_subscribers());

        let first = container.subscribe(|_| {});
        let second = container.subscribe(|_| {});
        assert_eq!(upstream.subscriber_count(), 1);

        drop(first);
        assert!(upstream.has_subscribers());
        drop(second);
        assert!(!upstream.has_subscribers());

        let _again = container.subscribe(|_| {});
        assert_eq!(upstream.subscriber_count(), 1);
    }

    #[test]
    fn test_upstream_events_become_transactions() {
        let upstream: Subscribable<Feed> = Subscribable::new("feed");
        let container = SubscriptionContainer::new(
            upstream.clone(),
            on_feed,
            ArrayBuffer::new(),
            &ContainerConfig::new().max_queue_size(2),
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _sub = container.subscribe(move |e: &ContainerEvent<u32>| {
            sink.lock().unwrap().push(e.clone())
        });

        upstream.dispatch(Feed::Snapshot(vec![1, 2]));
        upstream.dispatch(Feed::Price(3));

        assert_eq!(container.buffered_items(), vec![2, 3]);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            ContainerEvent::Update(element) => assert_eq!(element.remove, Some(vec![1])),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_events_before_subscription_are_not_seen() {
        let upstream: Subscribable<Feed> = Subscribable::new("feed");
        let container = SubscriptionContainer::new(
            upstream.clone(),
            on_feed,
            ArrayBuffer::new(),
            &ContainerConfig::default(),
        );

        upstream.dispatch(Feed::Price(1));
        assert_eq!(container.buffered_items_len(), 0);
    }

    #[test]
    fn test_handler_clear_hook() {
        struct Counting(Arc<AtomicUsize>);
        impl UpstreamHandler<Feed, SubscriberContainer<u32, ArrayBuffer<u32>>> for Counting {
            fn on_message(&self, event: &Feed, container: &SubscriberContainer<u32, ArrayBuffer<u32>>) {
                on_feed(event, container);
            }
            fn on_clear(&self, _container: &SubscriberContainer<u32, ArrayBuffer<u32>>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let clears = Arc::new(AtomicUsize::new(0));
        let upstream: Subscribable<Feed> = Subscribable::new("feed");
        let container = SubscriptionContainer::new(
            upstream,
            Counting(Arc::clone(&clears)),
            ArrayBuffer::new(),
            &ContainerConfig::default(),
        );
        container.clear();
        assert_eq!(clears.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_handle_keeps_feed_alive() {
        let upstream: Subscribable<Feed> = Subscribable::new("feed");
        let container = SubscriptionContainer::new(
            upstream.clone(),
            on_feed,
            ArrayBuffer::new(),
            &ContainerConfig::default(),
        );
        let sub = container.subscribe(|_| {});
        drop(container);

        upstream.dispatch(Feed::Price(5));
        assert_eq!(sub.buffered_items(), vec![5]);

        drop(sub);
        assert!(!upstream.has_subscribers());
    }
}
