//! Diagnostic observers
//!
//! An observer is injected into a [`Subscribable`](super::Subscribable) at
//! construction and sees every subscribe, unsubscribe and dispatch on it.
//! It has no effect on delivery.

use super::event::SubscriberId;

/// Side channel for subscribe/unsubscribe/dispatch activity
pub trait DebugObserver: Send + Sync {
    /// A subscriber was registered
    fn on_subscribe(&self, subscribable: &str, id: SubscriberId);

    /// A subscriber was removed
    fn on_unsubscribe(&self, subscribable: &str, id: SubscriberId);

    /// An event is about to be delivered
    fn on_dispatch(&self, subscribable: &str, event_type: &'static str);
}

/// Observer that forwards everything to `tracing` at trace level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DebugObserver for TracingObserver {
    fn on_subscribe(&self, subscribable: &str, id: SubscriberId) {
        tracing::trace!(subscribable, subscriber = %id, "subscribe");
    }

    fn on_unsubscribe(&self, subscribable: &str, id: SubscriberId) {
        tracing::trace!(subscribable, subscriber = %id, "unsubscribe");
    }

    fn on_dispatch(&self, subscribable: &str, event_type: &'static str) {
        tracing::trace!(subscribable, event = event_type, "dispatch");
    }
}
