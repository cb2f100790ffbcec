//! Lazy upstream activation
//!
//! A container fed by an upstream subscribable only holds a subscription on
//! it while the container itself has subscribers. The container installs an
//! [`Activation`] as its lifecycle hooks; the activation subscribes upstream
//! on the first local subscriber and drops the subscription on the last.

use std::sync::{Arc, Mutex};

use crate::subscribable::{lock, Lifecycle, Subscribable, SubscribableEvent, Subscription};

/// Translates upstream events into container mutations
///
/// `C` is the container handle the events are applied to. Closures of the
/// form `Fn(&U, &C)` implement this directly.
pub trait UpstreamHandler<U, C>: Send + Sync + 'static {
    fn on_message(&self, event: &U, container: &C);

    /// The container was cleared
    fn on_clear(&self, _container: &C) {}
}

impl<U, C, F> UpstreamHandler<U, C> for F
where
    F: Fn(&U, &C) + Send + Sync + 'static,
{
    fn on_message(&self, event: &U, container: &C) {
        self(event, container)
    }
}

/// Rebuilds a container handle from a weak reference
pub(crate) type Resolver<C> = Arc<dyn Fn() -> Option<C> + Send + Sync>;

trait Link<C>: Send + Sync {
    fn attach(&self, resolve: Resolver<C>);
    fn detach(&self);
    fn cleared(&self, container: &C);
}

struct UpstreamLink<U: SubscribableEvent, H> {
    upstream: Subscribable<U>,
    handler: Arc<H>,
    subscription: Mutex<Option<Subscription<U>>>,
}

impl<U, C, H> Link<C> for UpstreamLink<U, H>
where
    U: SubscribableEvent,
    C: 'static,
    H: UpstreamHandler<U, C>,
{
    fn attach(&self, resolve: Resolver<C>) {
        if lock(&self.subscription).is_some() {
            return;
        }

        let handler = Arc::clone(&self.handler);
        let subscription = self.upstream.subscribe(move |event: &U| {
            if let Some(container) = resolve() {
                handler.on_message(event, &container);
            }
        });
        tracing::debug!(upstream = self.upstream.name(), "Attached upstream");

        let mut slot = lock(&self.subscription);
        if slot.is_none() {
            *slot = Some(subscription);
        }
    }

    fn detach(&self) {
        let released = lock(&self.subscription).take();
        if released.is_some() {
            tracing::debug!(upstream = self.upstream.name(), "Released upstream");
        }
        drop(released);
    }

    fn cleared(&self, container: &C) {
        self.handler.on_clear(container);
    }
}

/// Lifecycle hooks that hold the upstream subscription
pub(crate) struct Activation<C> {
    link: Box<dyn Link<C>>,
    resolve: Resolver<C>,
}

impl<C: 'static> Activation<C> {
    pub(crate) fn new<U, H>(upstream: Subscribable<U>, handler: H, resolve: Resolver<C>) -> Self
    where
        U: SubscribableEvent,
        H: UpstreamHandler<U, C>,
    {
        Self {
            link: Box::new(UpstreamLink {
                upstream,
                handler: Arc::new(handler),
                subscription: Mutex::new(None),
            }),
            resolve,
        }
    }

    /// Forward a clear to the handler
    pub(crate) fn cleared(&self, container: &C) {
        self.link.cleared(container);
    }
}

impl<C: 'static> Lifecycle for Activation<C> {
    fn on_first_subscription(&self, _args: Option<&()>) {
        self.link.attach(Arc::clone(&self.resolve));
    }

    fn on_zero_subscriptions(&self) {
        self.link.detach();
    }
}
