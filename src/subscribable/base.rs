//! The notification primitive
//!
//! A [`Subscribable`] maps subscriber ids to callbacks and delivers events to
//! them synchronously, in registration order.
//!
//! # Re-entrancy
//!
//! Dispatch snapshots the subscriber list and releases the lock before any
//! callback runs, so a callback may subscribe, unsubscribe or dispatch on the
//! same instance. Each subscriber carries a liveness flag that is checked
//! right before its callback is invoked: once `unsubscribe` returns, the
//! callback is never called again, even by a dispatch loop that had already
//! taken its snapshot.
//!
//! # Failure isolation
//!
//! A panicking callback is caught, logged and skipped; the remaining
//! subscribers are still notified.

use std::any::Any;
use std::borrow::Cow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::event::{SubscribableEvent, SubscriberId};
use super::lock;
use super::observer::DebugObserver;

pub(crate) type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Lifecycle hooks of a [`Subscribable`]
///
/// Components that own a subscribable implement this and install themselves
/// with [`Subscribable::set_lifecycle`]. Hooks run with no internal lock held
/// and may call back into the subscribable.
pub trait Lifecycle<A = ()>: Send + Sync {
    /// The subscriber count went from zero to one
    fn on_first_subscription(&self, _args: Option<&A>) {}

    /// The subscriber count went back to zero
    fn on_zero_subscriptions(&self) {}

    /// A subscriber was registered (after `on_first_subscription`)
    fn on_subscribe(&self, _id: SubscriberId, _args: Option<&A>) {}

    /// A subscriber replaced its callback and arguments
    fn on_update(&self, _id: SubscriberId, _args: Option<&A>) {}

    /// A subscriber was removed (before `on_zero_subscriptions`)
    fn on_unsubscribe(&self, _id: SubscriberId) {}
}

pub(crate) struct Subscriber<E> {
    id: SubscriberId,
    callback: Mutex<Callback<E>>,
    types: Option<Vec<&'static str>>,
    alive: AtomicBool,
}

impl<E: SubscribableEvent> Subscriber<E> {
    fn wants(&self, event: &E) -> bool {
        match &self.types {
            Some(types) => types.contains(&event.event_type()),
            None => true,
        }
    }

    fn notify(&self, subscribable: &str, event: &E) {
        if !self.alive.load(Ordering::Acquire) || !self.wants(event) {
            return;
        }
        let callback = Arc::clone(&*lock(&self.callback));
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
            tracing::error!(
                subscribable,
                subscriber = %self.id,
                event = event.event_type(),
                panic = panic_message(panic.as_ref()),
                "Subscriber callback panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Subscriber,
    Listener,
}

struct State<E> {
    next_id: u64,
    subscribers: Vec<Arc<Subscriber<E>>>,
    listeners: Vec<Arc<Subscriber<E>>>,
}

struct Shared<E, A> {
    name: Cow<'static, str>,
    state: Mutex<State<E>>,
    lifecycle: Mutex<Option<Weak<dyn Lifecycle<A>>>>,
    observer: Option<Arc<dyn DebugObserver>>,
}

impl<E, A> Shared<E, A> {
    fn lifecycle(&self) -> Option<Arc<dyn Lifecycle<A>>> {
        lock(&self.lifecycle).as_ref().and_then(Weak::upgrade)
    }
}

/// A source of typed events with lifecycle hooks
///
/// `Subscribable` is a cheap handle: clones share the same subscriber map.
/// `A` is the type of the optional arguments a subscriber may pass when it
/// subscribes, forwarded to the [`Lifecycle`] hooks.
pub struct Subscribable<E, A = ()> {
    shared: Arc<Shared<E, A>>,
}

impl<E, A> Clone for Subscribable<E, A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E, A> std::fmt::Debug for Subscribable<E, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("Subscribable")
            .field("name", &self.shared.name)
            .field("subscribers", &state.subscribers.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl<E: SubscribableEvent, A: Send + Sync + 'static> Subscribable<E, A> {
    /// Create a new subscribable; `name` shows up in logs and observers
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self::build(name.into(), None)
    }

    /// Create a new subscribable reporting to a debug observer
    pub fn with_observer(
        name: impl Into<Cow<'static, str>>,
        observer: Arc<dyn DebugObserver>,
    ) -> Self {
        Self::build(name.into(), Some(observer))
    }

    fn build(name: Cow<'static, str>, observer: Option<Arc<dyn DebugObserver>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(State {
                    next_id: 1,
                    subscribers: Vec::new(),
                    listeners: Vec::new(),
                }),
                lifecycle: Mutex::new(None),
                observer,
            }),
        }
    }

    /// Install the lifecycle hooks
    ///
    /// Only a weak reference is kept so the owning component can hold the
    /// subscribable without a cycle.
    pub fn set_lifecycle(&self, hooks: Weak<dyn Lifecycle<A>>) {
        *lock(&self.shared.lifecycle) = Some(hooks);
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Register a callback for every event
    pub fn subscribe<F>(&self, callback: F) -> Subscription<E, A>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_with(callback, None, None)
    }

    /// Register a callback for events whose discriminant is in `types`
    pub fn subscribe_filtered<F>(&self, callback: F, types: &[&'static str]) -> Subscription<E, A>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_with(callback, None, Some(types))
    }

    /// Register a callback with subscriber arguments and an optional filter
    ///
    /// Fires `on_first_subscription` when this is the first subscriber, then
    /// `on_subscribe`.
    pub fn subscribe_with<F>(
        &self,
        callback: F,
        args: Option<A>,
        types: Option<&[&'static str]>,
    ) -> Subscription<E, A>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let (id, first) = self.register(Arc::new(callback), types, Role::Subscriber);
        let hooks = self.shared.lifecycle();
        if let Some(hooks) = &hooks {
            if first {
                hooks.on_first_subscription(args.as_ref());
            }
            hooks.on_subscribe(id, args.as_ref());
        }
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
            role: Role::Subscriber,
            armed: true,
        }
    }

    /// Register a callback and bundle a per-subscription capability with it
    ///
    /// `extension` is called once with the new id; its result travels with
    /// the returned handle.
    pub fn subscribe_extended<F, X>(
        &self,
        callback: F,
        args: Option<A>,
        types: Option<&[&'static str]>,
        extension: impl FnOnce(SubscriberId) -> X,
    ) -> super::ExtendedSubscription<E, X, A>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let subscription = self.subscribe_with(callback, args, types);
        let extension = extension(subscription.id());
        super::ExtendedSubscription::new(subscription, extension)
    }

    /// Register a listener
    ///
    /// Listeners are notified before subscribers on every dispatch, but they
    /// do not count as subscribers and never trigger lifecycle hooks.
    pub fn listen<F>(&self, callback: F, types: Option<&[&'static str]>) -> Subscription<E, A>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let (id, _) = self.register(Arc::new(callback), types, Role::Listener);
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
            role: Role::Listener,
            armed: true,
        }
    }

    fn register(
        &self,
        callback: Callback<E>,
        types: Option<&[&'static str]>,
        role: Role,
    ) -> (SubscriberId, bool) {
        let (id, first) = {
            let mut state = lock(&self.shared.state);
            let id = SubscriberId(state.next_id);
            state.next_id += 1;
            let subscriber = Arc::new(Subscriber {
                id,
                callback: Mutex::new(callback),
                types: types.map(<[_]>::to_vec),
                alive: AtomicBool::new(true),
            });
            match role {
                Role::Subscriber => {
                    state.subscribers.push(subscriber);
                    (id, state.subscribers.len() == 1)
                }
                Role::Listener => {
                    state.listeners.push(subscriber);
                    (id, false)
                }
            }
        };
        if role == Role::Subscriber {
            if let Some(observer) = &self.shared.observer {
                observer.on_subscribe(&self.shared.name, id);
            }
        }
        (id, first)
    }

    /// Deliver an event to every matching listener and subscriber
    pub fn dispatch(&self, event: E) {
        self.deliver(&event, None);
    }

    /// Deliver an event to listeners and to the given subscribers only
    ///
    /// Ids that are no longer registered are skipped.
    pub fn dispatch_to(&self, event: E, ids: &[SubscriberId]) {
        self.deliver(&event, Some(ids));
    }

    fn deliver(&self, event: &E, ids: Option<&[SubscriberId]>) {
        if let Some(observer) = &self.shared.observer {
            observer.on_dispatch(&self.shared.name, event.event_type());
        }

        let (listeners, subscribers) = {
            let state = lock(&self.shared.state);
            let subscribers: Vec<_> = match ids {
                None => state.subscribers.clone(),
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| state.subscribers.iter().find(|s| s.id == *id).cloned())
                    .collect(),
            };
            (state.listeners.clone(), subscribers)
        };

        for subscriber in listeners.iter().chain(subscribers.iter()) {
            subscriber.notify(&self.shared.name, event);
        }
    }

    /// Whether at least one subscriber is registered
    pub fn has_subscribers(&self) -> bool {
        !lock(&self.shared.state).subscribers.is_empty()
    }

    /// Number of registered subscribers (listeners excluded)
    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.state).subscribers.len()
    }

    /// Ids of registered subscribers, in registration order
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        lock(&self.shared.state)
            .subscribers
            .iter()
            .map(|s| s.id)
            .collect()
    }

    /// Whether `other` is a handle to the same subscribable
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<E: SubscribableEvent, A: Send + Sync + 'static> Shared<E, A> {
    fn update(&self, id: SubscriberId, role: Role, callback: Callback<E>, args: Option<A>) {
        let found = {
            let state = lock(&self.state);
            let list = match role {
                Role::Subscriber => &state.subscribers,
                Role::Listener => &state.listeners,
            };
            list.iter().find(|s| s.id == id).cloned()
        };
        let Some(subscriber) = found else {
            return;
        };
        if role == Role::Subscriber {
            if let Some(hooks) = self.lifecycle() {
                hooks.on_update(id, args.as_ref());
            }
        }
        *lock(&subscriber.callback) = callback;
    }

    fn remove(&self, id: SubscriberId, role: Role) {
        let (removed, now_empty) = {
            let mut state = lock(&self.state);
            let list = match role {
                Role::Subscriber => &mut state.subscribers,
                Role::Listener => &mut state.listeners,
            };
            match list.iter().position(|s| s.id == id) {
                Some(pos) => {
                    let subscriber = list.remove(pos);
                    subscriber.alive.store(false, Ordering::Release);
                    (true, list.is_empty())
                }
                None => (false, false),
            }
        };
        if !removed || role == Role::Listener {
            return;
        }

        if let Some(observer) = &self.observer {
            observer.on_unsubscribe(&self.name, id);
        }
        if let Some(hooks) = self.lifecycle() {
            hooks.on_unsubscribe(id);
            if now_empty {
                hooks.on_zero_subscriptions();
            }
        }
    }
}

/// Handle to one registration on a [`Subscribable`]
///
/// Dropping the handle unsubscribes. Use [`Subscription::detach`] to keep the
/// callback registered for the lifetime of the subscribable instead.
pub struct Subscription<E, A = ()>
where
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    shared: Weak<Shared<E, A>>,
    id: SubscriberId,
    role: Role,
    armed: bool,
}

impl<E: SubscribableEvent, A: Send + Sync + 'static> Subscription<E, A> {
    /// Id of this subscriber
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Replace the callback (and subscriber arguments) in place
    ///
    /// The subscriber keeps its id and its position in delivery order.
    pub fn update<F>(&self, callback: F, args: Option<A>)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        if let Some(shared) = self.shared.upgrade() {
            shared.update(self.id, self.role, Arc::new(callback), args);
        }
    }

    /// Remove the subscriber; its callback will not be invoked again
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Give up the handle without unsubscribing
    pub fn detach(mut self) {
        self.armed = false;
    }
}

impl<E: SubscribableEvent, A: Send + Sync + 'static> Drop for Subscription<E, A> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.id, self.role);
        }
    }
}

impl<E: SubscribableEvent, A: Send + Sync + 'static> std::fmt::Debug for Subscription<E, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("role", &self.role)
            .finish()
    }
}
