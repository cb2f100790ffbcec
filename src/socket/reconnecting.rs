//! Socket that replaces itself after an unclean close
//!
//! ```text
//!   open() ──► Opening ──open──► Open ──unclean close──► Disconnected
//!                                 ▲                          │
//!                                 └──open── Reconnecting ◄───┘  (also on wake)
//! ```
//!
//! Each reconnect builds a fresh inner [`Socket`]. The subscription on the
//! previous one is dropped first, so nothing it dispatches afterwards
//! reaches this socket's subscribers.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::subscribable::{
    lock, ExtendedSubscription, Lifecycle, Subscribable, SubscribableEvent, Subscription,
};

use super::config::SocketConfig;
use super::message::Message;
use super::socket::{CloseInfo, Socket, SocketEvent, SocketState};
use super::transport::Connector;
use super::wake::{SleepWakeDetector, WakeEvent};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectingState {
    Closed,
    Opening,
    Open,
    Closing,
    Reconnecting,
    Disconnected,
}

impl From<SocketState> for ReconnectingState {
    fn from(state: SocketState) -> Self {
        match state {
            SocketState::Closed => ReconnectingState::Closed,
            SocketState::Opening => ReconnectingState::Opening,
            SocketState::Open => ReconnectingState::Open,
            SocketState::Closing => ReconnectingState::Closing,
        }
    }
}

impl fmt::Display for ReconnectingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconnectingState::Closed => "closed",
            ReconnectingState::Opening => "opening",
            ReconnectingState::Open => "open",
            ReconnectingState::Closing => "closing",
            ReconnectingState::Reconnecting => "reconnecting",
            ReconnectingState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Events dispatched by a [`ReconnectingSocket`]
#[derive(Debug, Clone)]
pub enum ReconnectingSocketEvent {
    /// Relayed from the current inner socket
    Socket(SocketEvent),
    /// About to replace the inner socket
    Reconnecting,
    /// Open, after either the first connect or a reconnect
    Connected,
    /// Open again after a reconnect
    Reconnected,
    /// The inner socket closed uncleanly; a reconnect follows
    Disconnected(CloseInfo),
}

impl SubscribableEvent for ReconnectingSocketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReconnectingSocketEvent::Socket(event) => event.event_type(),
            ReconnectingSocketEvent::Reconnecting => "reconnecting",
            ReconnectingSocketEvent::Connected => "connected",
            ReconnectingSocketEvent::Reconnected => "reconnected",
            ReconnectingSocketEvent::Disconnected(_) => "disconnected",
        }
    }
}

struct State {
    phase: ReconnectingState,
    socket: Socket,
    subscription: Option<Subscription<SocketEvent>>,
    wake_subscription: Option<Subscription<WakeEvent>>,
}

struct Inner {
    subscribable: Subscribable<ReconnectingSocketEvent>,
    state: Mutex<State>,
    wake: SleepWakeDetector,
    weak_self: Weak<Inner>,
}

/// A [`Socket`] that reconnects on unclean closes and host wake-ups
///
/// `ReconnectingSocket` is a cheap handle. Dropping the last subscription
/// closes it.
#[derive(Clone)]
pub struct ReconnectingSocket {
    inner: Arc<Inner>,
}

impl fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("ReconnectingSocket")
            .field("state", &state.phase)
            .field("socket", &state.socket)
            .finish()
    }
}

impl ReconnectingSocket {
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, config: SocketConfig) -> Self {
        Self::with_wake_detector(url, connector, config, SleepWakeDetector::default())
    }

    /// Use `wake` instead of a default detector
    pub fn with_wake_detector(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        config: SocketConfig,
        wake: SleepWakeDetector,
    ) -> Self {
        let socket = Socket::new(url, connector, config);
        let inner = Arc::new_cyclic(|weak_self| Inner {
            subscribable: Subscribable::new("ReconnectingSocket"),
            state: Mutex::new(State {
                phase: ReconnectingState::Closed,
                socket,
                subscription: None,
                wake_subscription: None,
            }),
            wake,
            weak_self: weak_self.clone(),
        });
        let hooks: Weak<dyn Lifecycle> = Arc::downgrade(&inner) as Weak<dyn Lifecycle>;
        inner.subscribable.set_lifecycle(hooks);
        Self { inner }
    }

    /// Subscribe to every event; the extension is a handle to this socket
    pub fn subscribe<F>(
        &self,
        callback: F,
    ) -> ExtendedSubscription<ReconnectingSocketEvent, ReconnectingSocket>
    where
        F: Fn(&ReconnectingSocketEvent) + Send + Sync + 'static,
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
    ) -> ExtendedSubscription<ReconnectingSocketEvent, ReconnectingSocket>
    where
        F: Fn(&ReconnectingSocketEvent) + Send + Sync + 'static,
    {
        self.inner
            .subscribable
            .subscribe_extended(callback, None, Some(types), |_| self.clone())
    }

    pub fn subscribable(&self) -> &Subscribable<ReconnectingSocketEvent> {
        &self.inner.subscribable
    }

    pub fn state(&self) -> ReconnectingState {
        lock(&self.inner.state).phase
    }

    /// The current inner socket
    pub fn socket(&self) -> Socket {
        lock(&self.inner.state).socket.clone()
    }

    pub fn url(&self) -> String {
        self.socket().url()
    }

    /// Change the URL for this and every later inner socket
    pub fn set_url(&self, url: impl Into<String>) {
        self.socket().set_url(url);
    }

    /// Start connecting in the background
    ///
    /// Requires a tokio runtime. Does nothing while opening, open or
    /// reconnecting.
    pub fn open(&self) {
        self.inner.open();
    }

    /// Tear down the inner socket and connect a fresh one
    pub fn reconnect(&self) {
        self.inner.reconnect();
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn send(&self, message: impl Into<Message>) {
        self.socket().send(message);
    }

    pub fn send_object<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.socket().send_object(value)
    }
}

impl Inner {
    fn open(&self) {
        let current = {
            let mut state = lock(&self.state);
            if matches!(
                state.phase,
                ReconnectingState::Opening | ReconnectingState::Open | ReconnectingState::Reconnecting
            ) {
                return;
            }
            state.phase = ReconnectingState::Opening;
            state.socket.clone()
        };

        let socket = if current.state() == SocketState::Closed {
            current
        } else {
            current.close();
            replacement(&current)
        };

        let released = {
            let mut state = lock(&self.state);
            let mut released = None;
            if !state.socket.ptr_eq(&socket) {
                state.socket = socket.clone();
                released = state.subscription.take();
            }
            if state.subscription.is_none() {
                state.subscription = Some(self.watch(&socket));
            }
            released
        };
        drop(released);

        self.ensure_wake();
        socket.spawn_open();
    }

    fn reconnect(&self) {
        let (old_socket, old_subscription) = {
            let mut state = lock(&self.state);
            state.phase = ReconnectingState::Reconnecting;
            (state.socket.clone(), state.subscription.take())
        };
        self.ensure_wake();
        tracing::info!(socket = %old_socket.url(), "Reconnecting");
        self.subscribable.dispatch(ReconnectingSocketEvent::Reconnecting);

        drop(old_subscription);
        old_socket.close();

        let socket = replacement(&old_socket);
        let subscription = self.watch(&socket);
        {
            let mut state = lock(&self.state);
            if state.phase != ReconnectingState::Reconnecting {
                // Closed from a `reconnecting` callback
                return;
            }
            state.socket = socket.clone();
            state.subscription = Some(subscription);
        }
        socket.spawn_open();
    }

    fn close(&self) {
        let (socket, wake_subscription) = {
            let mut state = lock(&self.state);
            (state.socket.clone(), state.wake_subscription.take())
        };
        drop(wake_subscription);
        socket.close();
        lock(&self.state).phase = socket.state().into();
    }

    fn watch(&self, socket: &Socket) -> Subscription<SocketEvent> {
        let weak = self.weak_self.clone();
        socket.subscribable().subscribe(move |event: &SocketEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_socket_event(event);
            }
        })
    }

    fn ensure_wake(&self) {
        let mut state = lock(&self.state);
        if state.wake_subscription.is_some() {
            return;
        }
        let weak = self.weak_self.clone();
        state.wake_subscription = Some(self.wake.subscribe(move |event: &WakeEvent| {
            if let Some(inner) = weak.upgrade() {
                let WakeEvent::Wake { gap } = event;
                tracing::info!(gap_ms = gap.as_millis() as u64, "Host woke up, reconnecting");
                inner.reconnect();
            }
        }));
    }

    fn on_socket_event(&self, event: &SocketEvent) {
        match event {
            SocketEvent::Close(info) if info.was_clean => {
                let released = {
                    let mut state = lock(&self.state);
                    state.phase = ReconnectingState::Closed;
                    state.subscription.take()
                };
                self.subscribable
                    .dispatch(ReconnectingSocketEvent::Socket(event.clone()));
                drop(released);
            }
            SocketEvent::Close(info) => {
                lock(&self.state).phase = ReconnectingState::Disconnected;
                tracing::warn!(
                    code = info.code,
                    reason = %info.reason,
                    "Socket disconnected"
                );
                self.subscribable
                    .dispatch(ReconnectingSocketEvent::Disconnected(info.clone()));
                self.reconnect();
            }
            SocketEvent::Open => {
                let reconnected = {
                    let mut state = lock(&self.state);
                    let reconnected = state.phase == ReconnectingState::Reconnecting;
                    state.phase = ReconnectingState::Open;
                    reconnected
                };
                if reconnected {
                    self.subscribable.dispatch(ReconnectingSocketEvent::Reconnected);
                } else {
                    self.subscribable
                        .dispatch(ReconnectingSocketEvent::Socket(SocketEvent::Open));
                }
                self.subscribable.dispatch(ReconnectingSocketEvent::Connected);
            }
            SocketEvent::Closing => {
                lock(&self.state).phase = ReconnectingState::Closing;
            }
            SocketEvent::Error(err) => {
                if matches!(**err, Error::RetriesExhausted { .. }) {
                    lock(&self.state).phase = ReconnectingState::Closed;
                }
                self.subscribable
                    .dispatch(ReconnectingSocketEvent::Socket(event.clone()));
            }
            _ => self
                .subscribable
                .dispatch(ReconnectingSocketEvent::Socket(event.clone())),
        }
    }
}

impl Lifecycle for Inner {
    fn on_zero_subscriptions(&self) {
        self.close();
    }
}

fn replacement(socket: &Socket) -> Socket {
    Socket::new(socket.url(), socket.connector(), socket.config().clone())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::socket::config::BackoffConfig;
    use crate::socket::socket::CLOSE_ABNORMAL;
    use crate::socket::testing::{record, settle, MockConnector};
    use crate::socket::transport::Outbound;

    fn reconnecting(connector: &MockConnector) -> ReconnectingSocket {
        ReconnectingSocket::new("mock://feed", Arc::new(connector.clone()), SocketConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclean_close_reconnects() {
        let connector = MockConnector::new();
        let socket = reconnecting(&connector);
        let (events, _sub) = record(socket.subscribable());

        socket.open();
        settle().await;
        assert_eq!(socket.state(), ReconnectingState::Open);

        let stale = connector.peer(0);
        stale.close(CLOSE_ABNORMAL, "network down", false);
        settle().await;
        assert_eq!(socket.state(), ReconnectingState::Open);
        assert_eq!(connector.connections(), 2);

        assert!(!stale.deliver("from the old connection"));
        connector.peer(1).deliver("fresh");
        settle().await;

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "open",
                "connected",
                "disconnected",
                "reconnecting",
                "reconnected",
                "connected",
                "response"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_close_stays_closed() {
        let connector = MockConnector::new();
        let socket = reconnecting(&connector);
        let (events, _sub) = record(socket.subscribable());

        socket.open();
        settle().await;
        socket.close();
        settle().await;

        assert_eq!(socket.state(), ReconnectingState::Closed);
        assert_eq!(connector.connections(), 1);
        assert_eq!(*events.lock().unwrap(), vec!["open", "connected", "close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_follow_the_current_socket() {
        let connector = MockConnector::new();
        let socket = reconnecting(&connector);
        let _sub = socket.subscribe(|_| {});

        socket.open();
        socket.send("queued");
        settle().await;
        socket.reconnect();
        socket.send("after");
        settle().await;

        assert_eq!(connector.sent(0), vec![Outbound::Send(Message::from("queued")), Outbound::Close]);
        assert_eq!(connector.sent(1), vec![Outbound::Send(Message::from("after"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_forces_reconnect() {
        let connector = MockConnector::new();
        let wake = SleepWakeDetector::default();
        let socket = ReconnectingSocket::with_wake_detector(
            "mock://feed",
            Arc::new(connector.clone()),
            SocketConfig::default(),
            wake.clone(),
        );
        let (events, _sub) = record(socket.subscribable());

        socket.open();
        settle().await;
        wake.notify_wake();
        settle().await;

        assert_eq!(connector.connections(), 2);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["open", "connected", "reconnecting", "reconnected", "connected"]
        );

        socket.close();
        assert!(!wake.subscribable().has_subscribers());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_unsubscribe_closes() {
        let connector = MockConnector::new();
        let socket = reconnecting(&connector);
        let sub = socket.subscribe(|_| {});

        socket.open();
        settle().await;
        assert_eq!(sub.state(), ReconnectingState::Open);

        drop(sub);
        assert_eq!(socket.state(), ReconnectingState::Closed);
        assert_eq!(socket.socket().state(), SocketState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_end_closed() {
        let connector = MockConnector::new().failing(u32::MAX);
        let socket = ReconnectingSocket::new(
            "mock://feed",
            Arc::new(connector.clone()),
            SocketConfig::new().backoff(
                BackoffConfig::new()
                    .initial_delay(Duration::from_millis(10))
                    .max_attempts(3),
            ),
        );
        let (events, _sub) = record(socket.subscribable());

        socket.open();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(connector.attempts(), 3);
        assert_eq!(socket.state(), ReconnectingState::Closed);
        assert_eq!(*events.lock().unwrap(), vec!["error"]);
    }
}
