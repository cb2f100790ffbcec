//! A value cell that notifies on every update

use std::sync::{Arc, Mutex};

use super::base::{Subscribable, Subscription};
use super::event::SubscribableEvent;
use super::lock;

/// Event dispatched by [`SubscribableHolder`]
#[derive(Debug, Clone, PartialEq)]
pub enum HolderEvent<T> {
    /// The held value was replaced
    Update(T),
}

impl<T: Clone + Send + Sync + 'static> SubscribableEvent for HolderEvent<T> {
    fn event_type(&self) -> &'static str {
        "update"
    }
}

/// Holds one value and dispatches `update` each time it is set
///
/// Unlike an observable that compares old and new values, every call to
/// [`update`](Self::update) notifies.
pub struct SubscribableHolder<T> {
    value: Arc<Mutex<T>>,
    subscribable: Subscribable<HolderEvent<T>>,
}

impl<T> Clone for SubscribableHolder<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            subscribable: self.subscribable.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SubscribableHolder<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(Mutex::new(value)),
            subscribable: Subscribable::new("SubscribableHolder"),
        }
    }

    /// Store a new value and notify subscribers
    pub fn update(&self, value: T) {
        *lock(&self.value) = value.clone();
        self.subscribable.dispatch(HolderEvent::Update(value));
    }

    /// Current value
    pub fn value(&self) -> T {
        lock(&self.value).clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<HolderEvent<T>>
    where
        F: Fn(&HolderEvent<T>) + Send + Sync + 'static,
    {
        self.subscribable.subscribe(callback)
    }

    /// The underlying subscribable, e.g. to register it with a multiplexer
    pub fn subscribable(&self) -> &Subscribable<HolderEvent<T>> {
        &self.subscribable
    }
}
