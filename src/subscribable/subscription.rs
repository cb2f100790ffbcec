//! Subscriptions that carry extra capabilities

use std::ops::Deref;

use super::base::Subscription;
use super::event::{SubscribableEvent, SubscriberId};

/// A [`Subscription`] bundled with a per-subscriber capability value
///
/// Components such as containers and sockets hand their subscribers a handle
/// (pause/resume, send, ...) alongside the registration. The capability is
/// built at subscribe time for this subscriber only.
pub struct ExtendedSubscription<E, X, A = ()>
where
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    subscription: Subscription<E, A>,
    extension: X,
}

impl<E, X, A> ExtendedSubscription<E, X, A>
where
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    pub(crate) fn new(subscription: Subscription<E, A>, extension: X) -> Self {
        Self {
            subscription,
            extension,
        }
    }

    /// Id of the underlying subscriber
    pub fn id(&self) -> SubscriberId {
        self.subscription.id()
    }

    /// The plain registration
    pub fn subscription(&self) -> &Subscription<E, A> {
        &self.subscription
    }

    /// The capability value
    pub fn extension(&self) -> &X {
        &self.extension
    }

    /// Replace the callback in place
    pub fn update<F>(&self, callback: F, args: Option<A>)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscription.update(callback, args);
    }

    /// Remove the subscriber
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Split into the registration and the capability
    pub fn into_parts(self) -> (Subscription<E, A>, X) {
        (self.subscription, self.extension)
    }
}

impl<E, X, A> Deref for ExtendedSubscription<E, X, A>
where
    E: SubscribableEvent,
    A: Send + Sync + 'static,
{
    type Target = X;

    fn deref(&self) -> &X {
        &self.extension
    }
}
