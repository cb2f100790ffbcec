//! Publish/subscribe primitives
//!
//! [`Subscribable`] is the building block every other component composes:
//! containers publish their transactions through one, sockets publish their
//! connection events through one, and the [`SubscribableMultiplexer`] fans
//! several of them into one.
//!
//! ```text
//!   owner ──dispatch(event)──► Subscribable ──► listener, listener, ...
//!     ▲                           │       └───► subscriber #1, #2, ...
//!     └──── Lifecycle hooks ◄─────┘  (first / zero / subscribe / update)
//! ```

pub mod base;
pub mod event;
pub mod field_tracker;
pub mod holder;
pub mod multiplexer;
pub mod observer;
pub mod subscription;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use base::{Lifecycle, Subscribable, Subscription};
pub use event::{SubscribableEvent, SubscriberId};
pub use field_tracker::{
    FieldCallbacks, FieldObserver, LimitedSubscriptionFieldTracker, SubscriptionFieldTracker,
    UpdateFields,
};
pub use holder::{HolderEvent, SubscribableHolder};
pub use multiplexer::{MultiplexerEvent, SubscribableMultiplexer};
pub use observer::{DebugObserver, TracingObserver};
pub use subscription::ExtendedSubscription;

/// Lock a mutex, recovering the data if a previous holder panicked
///
/// Callbacks never run under these locks, so a poisoned lock only means a
/// panic happened in bookkeeping code and the data is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
