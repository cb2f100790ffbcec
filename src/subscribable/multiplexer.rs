//! Fan-in/fan-out across a dynamic, keyed set of subscribables
//!
//! While the multiplexer has subscribers it holds exactly one subscription
//! on every child and relays child events verbatim. Membership changes are
//! announced with `subscribable-multiplexer-add` / `-removed` events.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use super::base::{Lifecycle, Subscribable, Subscription};
use super::event::{SubscribableEvent, SubscriberId};
use super::lock;

/// Events dispatched by a [`SubscribableMultiplexer`]
pub enum MultiplexerEvent<K, E, A = ()> {
    /// A child was added (or rebound to a different subscribable)
    Add {
        id: K,
        subscribable: Subscribable<E, A>,
    },
    /// A child was removed
    Removed { id: K },
    /// An event relayed from a child
    Relay(E),
}

impl<K: Clone, E: Clone, A> Clone for MultiplexerEvent<K, E, A> {
    fn clone(&self) -> Self {
        match self {
            MultiplexerEvent::Add { id, subscribable } => MultiplexerEvent::Add {
                id: id.clone(),
                subscribable: subscribable.clone(),
            },
            MultiplexerEvent::Removed { id } => MultiplexerEvent::Removed { id: id.clone() },
            MultiplexerEvent::Relay(event) => MultiplexerEvent::Relay(event.clone()),
        }
    }
}

impl<K: std::fmt::Debug, E: std::fmt::Debug, A> std::fmt::Debug for MultiplexerEvent<K, E, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MultiplexerEvent::Add { id, .. } => f.debug_struct("Add").field("id", id).finish(),
            MultiplexerEvent::Removed { id } => f.debug_struct("Removed").field("id", id).finish(),
            MultiplexerEvent::Relay(event) => f.debug_tuple("Relay").field(event).finish(),
        }
    }
}

impl<K, E, A> SubscribableEvent for MultiplexerEvent<K, E, A>
where
    K: Clone + Send + Sync + 'static,
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    fn event_type(&self) -> &'static str {
        match self {
            MultiplexerEvent::Add { .. } => "subscribable-multiplexer-add",
            MultiplexerEvent::Removed { .. } => "subscribable-multiplexer-removed",
            MultiplexerEvent::Relay(event) => event.event_type(),
        }
    }
}

struct MuxState<K, E, A>
where
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    children: HashMap<K, Subscribable<E, A>>,
    /// `Some` exactly while the multiplexer itself has subscribers
    subscriptions: Option<HashMap<K, Subscription<E, A>>>,
}

struct Inner<K, E, A>
where
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    subscribable: Subscribable<MultiplexerEvent<K, E, A>, A>,
    state: Mutex<MuxState<K, E, A>>,
    weak_self: Weak<Inner<K, E, A>>,
}

/// Multiplexes keyed child subscribables into one event stream
pub struct SubscribableMultiplexer<K, E, A = ()>
where
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    inner: Arc<Inner<K, E, A>>,
}

impl<K, E, A> Clone for SubscribableMultiplexer<K, E, A>
where
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, E, A> SubscribableMultiplexer<K, E, A>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    E: SubscribableEvent,
    A: Clone + Send + Sync + 'static,
{
    /// Create a multiplexer over an initial set of children
    pub fn new(children: impl IntoIterator<Item = (K, Subscribable<E, A>)>) -> Self {
        let inner = Arc::new_cyclic(|weak_self| Inner {
            subscribable: Subscribable::new("SubscribableMultiplexer"),
            state: Mutex::new(MuxState {
                children: children.into_iter().collect(),
                subscriptions: None,
            }),
            weak_self: weak_self.clone(),
        });
        let hooks: Weak<dyn Lifecycle<A>> = Arc::downgrade(&inner) as Weak<dyn Lifecycle<A>>;
        inner.subscribable.set_lifecycle(hooks);
        Self { inner }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<MultiplexerEvent<K, E, A>, A>
    where
        F: Fn(&MultiplexerEvent<K, E, A>) + Send + Sync + 'static,
    {
        self.inner.subscribable.subscribe(callback)
    }

    /// Subscribe with arguments that are forwarded to every child
    pub fn subscribe_with<F>(
        &self,
        callback: F,
        args: Option<A>,
        types: Option<&[&'static str]>,
    ) -> Subscription<MultiplexerEvent<K, E, A>, A>
    where
        F: Fn(&MultiplexerEvent<K, E, A>) + Send + Sync + 'static,
    {
        self.inner.subscribable.subscribe_with(callback, args, types)
    }

    /// The multiplexer's own subscribable
    pub fn subscribable(&self) -> &Subscribable<MultiplexerEvent<K, E, A>, A> {
        &self.inner.subscribable
    }

    /// Add or rebind a child
    ///
    /// Adding the same subscribable under the same id is a no-op. Rebinding
    /// an id to a different subscribable releases the old subscription.
    pub fn add(&self, id: K, child: Subscribable<E, A>) {
        self.inner.add(id, child);
    }

    /// Remove a child; dispatches `subscribable-multiplexer-removed` if it existed
    pub fn remove(&self, id: &K) {
        self.inner.remove(id);
    }

    /// Swap the membership for a new list
    ///
    /// Ids only in the current set are removed, ids only in the new list are
    /// added, and ids in both are re-added so that a changed child is rebound.
    pub fn replace(&self, children: impl IntoIterator<Item = (K, Subscribable<E, A>)>) {
        let next: Vec<(K, Subscribable<E, A>)> = children.into_iter().collect();
        let next_keys: HashSet<&K> = next.iter().map(|(k, _)| k).collect();
        let current: HashSet<K> = lock(&self.inner.state).children.keys().cloned().collect();

        let only_current: Vec<&K> = current.iter().filter(|k| !next_keys.contains(k)).collect();
        for id in only_current {
            self.inner.remove(id);
        }

        let (only_next, both): (Vec<_>, Vec<_>) =
            next.into_iter().partition(|(k, _)| !current.contains(k));
        for (id, child) in only_next {
            self.inner.add(id, child);
        }
        for (id, child) in both {
            self.inner.add(id, child);
        }
    }

    /// Child registered under `id`
    pub fn get(&self, id: &K) -> Option<Subscribable<E, A>> {
        lock(&self.inner.state).children.get(id).cloned()
    }

    /// Ids of all children
    pub fn ids(&self) -> Vec<K> {
        lock(&self.inner.state).children.keys().cloned().collect()
    }

    /// Number of children
    pub fn len(&self) -> usize {
        lock(&self.inner.state).children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, E, A> Inner<K, E, A>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    E: SubscribableEvent,
    A: Clone + Send + Sync + 'static,
{
    fn relay(&self) -> impl Fn(&E) + Send + Sync + 'static {
        let weak = self.weak_self.clone();
        move |event: &E| {
            if let Some(inner) = weak.upgrade() {
                inner
                    .subscribable
                    .dispatch(MultiplexerEvent::Relay(event.clone()));
            }
        }
    }

    fn add(&self, id: K, child: Subscribable<E, A>) {
        let (previous, active) = {
            let mut state = lock(&self.state);
            if state
                .children
                .get(&id)
                .is_some_and(|existing| existing.ptr_eq(&child))
            {
                return;
            }
            state.children.insert(id.clone(), child.clone());
            let previous = state.subscriptions.as_mut().and_then(|subs| subs.remove(&id));
            (previous, state.subscriptions.is_some())
        };
        drop(previous);

        if active {
            let subscription = child.subscribe(self.relay());
            let leftover = {
                let mut state = lock(&self.state);
                match state.subscriptions.as_mut() {
                    Some(subs) => subs.insert(id.clone(), subscription),
                    None => Some(subscription),
                }
            };
            drop(leftover);
        }

        self.subscribable.dispatch(MultiplexerEvent::Add {
            id,
            subscribable: child,
        });
    }

    fn remove(&self, id: &K) {
        let (subscription, existed) = {
            let mut state = lock(&self.state);
            let subscription = state.subscriptions.as_mut().and_then(|subs| subs.remove(id));
            (subscription, state.children.remove(id).is_some())
        };
        drop(subscription);

        if existed {
            self.subscribable
                .dispatch(MultiplexerEvent::Removed { id: id.clone() });
        }
    }
}

impl<K, E, A> Lifecycle<A> for Inner<K, E, A>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    E: SubscribableEvent,
    A: Clone + Send + Sync + 'static,
{
    fn on_first_subscription(&self, args: Option<&A>) {
        let children: Vec<(K, Subscribable<E, A>)> = {
            let mut state = lock(&self.state);
            state.subscriptions = Some(HashMap::new());
            state
                .children
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        for (id, child) in children {
            let subscription = child.subscribe_with(self.relay(), args.cloned(), None);
            let leftover = {
                let mut state = lock(&self.state);
                match state.subscriptions.as_mut() {
                    Some(subs) if !subs.contains_key(&id) => {
                        subs.insert(id, subscription);
                        None
                    }
                    _ => Some(subscription),
                }
            };
            drop(leftover);
        }
    }

    fn on_zero_subscriptions(&self) {
        let subscriptions = lock(&self.state).subscriptions.take();
        drop(subscriptions);
    }

    fn on_unsubscribe(&self, id: SubscriberId) {
        tracing::trace!(subscriber = %id, "Multiplexer subscriber removed");
    }
}
