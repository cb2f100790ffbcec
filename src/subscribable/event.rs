//! Event and subscriber identity types

use std::fmt;

/// An event that can be dispatched by a [`Subscribable`](super::Subscribable)
///
/// Every event enum exposes a discriminant string. Subscribers may filter on
/// it, and the strings are the compatibility surface shared with other
/// implementations, so they must be unique within one event enum.
pub trait SubscribableEvent: Clone + Send + Sync + 'static {
    /// Discriminant of this event (e.g. `"update"`, `"queued"`)
    fn event_type(&self) -> &'static str;
}

/// Identifier of one subscriber, unique within its subscribable
///
/// Ids are handed out by a per-instance counter, so they are ordered by
/// registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl SubscriberId {
    /// Raw counter value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
