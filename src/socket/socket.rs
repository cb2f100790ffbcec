//! Socket state machine
//!
//! ```text
//!   Closed ──open()──► Opening ──connected──► Open ──close()──► Closing ──► Closed
//!                        │  ▲                   │
//!                        │  └── backoff sleep   └── transport closed ──► Closed
//!                        └──close()──► Closed
//! ```
//!
//! Every call to `open` starts a new generation. A connection that resolves
//! for an older generation, or after the socket left `Opening`, is closed
//! instead of adopted, and its events are ignored.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, Notify};

use crate::error::{Error, Result};
use crate::subscribable::{lock, ExtendedSubscription, Lifecycle, Subscribable, SubscribableEvent};

use super::backoff::Backoff;
use super::config::SocketConfig;
use super::message::Message;
use super::transport::{Connection, Connector, Outbound, TransportEvent};

/// Close code for a normal shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code for a connection that ended without a close handshake
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketState::Closed => "closed",
            SocketState::Opening => "opening",
            SocketState::Open => "open",
            SocketState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// How a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseInfo {
    /// A clean close initiated locally
    pub fn normal() -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: String::new(),
            was_clean: true,
        }
    }
}

/// Events dispatched by a [`Socket`]
#[derive(Debug, Clone)]
pub enum SocketEvent {
    Open,
    Closing,
    Close(CloseInfo),
    /// A frame was handed to the transport
    Request(Message),
    /// A frame arrived on the active connection
    Response(Message),
    Error(Arc<Error>),
    UrlUpdate(String),
}

impl SubscribableEvent for SocketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SocketEvent::Open => "open",
            SocketEvent::Closing => "closing",
            SocketEvent::Close(_) => "close",
            SocketEvent::Request(_) => "request",
            SocketEvent::Response(_) => "response",
            SocketEvent::Error(_) => "error",
            SocketEvent::UrlUpdate(_) => "url-update",
        }
    }
}

struct Active {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

struct State {
    phase: SocketState,
    url: String,
    generation: u64,
    active: Option<Active>,
    queue: Vec<Message>,
}

struct Inner {
    subscribable: Subscribable<SocketEvent>,
    state: Mutex<State>,
    config: SocketConfig,
    connector: Arc<dyn Connector>,
    cancel: Notify,
    weak_self: Weak<Inner>,
}

/// A message socket with queued sends and connect backoff
///
/// `Socket` is a cheap handle; clones drive the same connection. Transport
/// failures never surface as `Err`: they are dispatched as `error` and
/// `close` events. Dropping the last subscription closes the socket.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<Inner>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Socket")
            .field("url", &state.url)
            .field("state", &state.phase)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl Socket {
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, config: SocketConfig) -> Self {
        let inner = Arc::new_cyclic(|weak_self| Inner {
            subscribable: Subscribable::new("Socket"),
            state: Mutex::new(State {
                phase: SocketState::Closed,
                url: url.into(),
                generation: 0,
                active: None,
                queue: Vec::new(),
            }),
            config,
            connector,
            cancel: Notify::new(),
            weak_self: weak_self.clone(),
        });
        let hooks: Weak<dyn Lifecycle> = Arc::downgrade(&inner) as Weak<dyn Lifecycle>;
        inner.subscribable.set_lifecycle(hooks);
        Self { inner }
    }

    /// Subscribe to every event; the extension is a handle to this socket
    pub fn subscribe<F>(&self, callback: F) -> ExtendedSubscription<SocketEvent, Socket>
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
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
    ) -> ExtendedSubscription<SocketEvent, Socket>
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.inner
            .subscribable
            .subscribe_extended(callback, None, Some(types), |_| self.clone())
    }

    pub fn subscribable(&self) -> &Subscribable<SocketEvent> {
        &self.inner.subscribable
    }

    pub fn state(&self) -> SocketState {
        lock(&self.inner.state).phase
    }

    pub fn url(&self) -> String {
        lock(&self.inner.state).url.clone()
    }

    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::clone(&self.inner.connector)
    }

    /// Whether `other` drives the same connection
    pub fn ptr_eq(&self, other: &Socket) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Change the URL used by the next connect attempt
    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        lock(&self.inner.state).url = url.clone();
        self.inner.subscribable.dispatch(SocketEvent::UrlUpdate(url));
    }

    /// Connect, retrying with backoff
    ///
    /// Does nothing unless the socket is closed. Resolves once the socket is
    /// open, has given up, or was closed while connecting.
    pub async fn open(&self) {
        if let Some(generation) = self.inner.begin_open() {
            self.connect(generation).await;
        }
    }

    /// Enter `Opening` now and connect on a spawned task
    ///
    /// Sends made right after this call are queued. Logs and does nothing
    /// outside a tokio runtime.
    pub fn spawn_open(&self) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::error!(socket = %self.url(), "No tokio runtime to open socket on");
                return;
            }
        };
        if let Some(generation) = self.inner.begin_open() {
            let socket = self.clone();
            handle.spawn(async move { socket.connect(generation).await });
        }
    }

    async fn connect(&self, generation: u64) {
        let mut backoff = Backoff::new(&self.inner.config.backoff);
        loop {
            let cancelled = self.inner.cancel.notified();
            let Some(url) = self.inner.opening_url(generation) else {
                return;
            };

            let attempt = backoff.attempts() + 1;
            tracing::debug!(socket = %url, attempt, "Connecting");
            let result = tokio::select! {
                result = self.inner.connector.connect(&url, &self.inner.config) => result,
                _ = cancelled => {
                    tracing::debug!(socket = %url, "Connect cancelled");
                    return;
                }
            };

            let err = match result {
                Ok(connection) => {
                    self.inner.adopt(connection, generation);
                    return;
                }
                Err(e) => e,
            };
            tracing::warn!(socket = %url, attempt, error = %err, "Connect failed");

            match backoff.next_delay() {
                Some(delay) => {
                    let cancelled = self.inner.cancel.notified();
                    if self.inner.opening_url(generation).is_none() {
                        return;
                    }
                    tracing::debug!(socket = %url, delay_ms = delay.as_millis() as u64, "Retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancelled => {
                            tracing::debug!(socket = %url, "Backoff cancelled");
                            return;
                        }
                    }
                }
                None => {
                    self.inner.give_up(generation, backoff.attempts());
                    return;
                }
            }
        }
    }

    /// Close the connection or abandon a connect in progress
    pub fn close(&self) {
        self.inner.close();
    }

    /// Send a frame
    ///
    /// Queued while opening, dropped with a warning while closed or closing.
    pub fn send(&self, message: impl Into<Message>) {
        self.inner.send(message.into());
    }

    /// Serialize `value` as JSON and send it as a text frame
    pub fn send_object<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.send(Message::Text(text));
        Ok(())
    }
}

impl Inner {
    fn begin_open(&self) -> Option<u64> {
        let mut state = lock(&self.state);
        if state.phase != SocketState::Closed {
            return None;
        }
        state.phase = SocketState::Opening;
        state.generation += 1;
        tracing::info!(socket = %state.url, generation = state.generation, "Opening socket");
        Some(state.generation)
    }

    /// Current URL if `generation` is still the one opening
    fn opening_url(&self, generation: u64) -> Option<String> {
        let state = lock(&self.state);
        (state.phase == SocketState::Opening && state.generation == generation)
            .then(|| state.url.clone())
    }

    fn is_active(&self, generation: u64) -> bool {
        lock(&self.state)
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    fn adopt(&self, connection: Connection, generation: u64) {
        let (outbound, inbound) = connection.into_parts();

        let (url, flushed) = {
            let mut state = lock(&self.state);
            if state.phase != SocketState::Opening || state.generation != generation {
                let _ = outbound.send(Outbound::Close);
                tracing::debug!(socket = %state.url, generation, "Discarded stale connection");
                return;
            }

            state.phase = SocketState::Open;
            let queue = std::mem::take(&mut state.queue);
            let mut flushed = Vec::with_capacity(queue.len());
            for message in queue {
                if outbound.send(Outbound::Send(message.clone())).is_ok() {
                    flushed.push(message);
                }
            }
            state.active = Some(Active {
                generation,
                outbound,
            });
            (state.url.clone(), flushed)
        };

        tracing::info!(socket = %url, flushed = flushed.len(), "Socket open");
        for message in flushed {
            self.subscribable.dispatch(SocketEvent::Request(message));
        }
        self.subscribable.dispatch(SocketEvent::Open);

        tokio::spawn(read_loop(self.weak_self.clone(), inbound, generation));
    }

    fn give_up(&self, generation: u64, attempts: u32) {
        {
            let mut state = lock(&self.state);
            if state.phase != SocketState::Opening || state.generation != generation {
                return;
            }
            state.phase = SocketState::Closed;
            state.queue.clear();
            tracing::error!(socket = %state.url, attempts, "Giving up connecting");
        }
        self.subscribable
            .dispatch(SocketEvent::Error(Arc::new(Error::RetriesExhausted { attempts })));
    }

    fn transport_closed(&self, generation: u64, info: CloseInfo) {
        {
            let mut state = lock(&self.state);
            if !state
                .active
                .as_ref()
                .is_some_and(|active| active.generation == generation)
            {
                return;
            }
            state.active = None;
            state.phase = SocketState::Closed;
            state.queue.clear();
            tracing::info!(
                socket = %state.url,
                code = info.code,
                clean = info.was_clean,
                "Socket closed by transport"
            );
        }
        self.subscribable.dispatch(SocketEvent::Close(info));
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        state.queue.clear();
        let phase = state.phase;
        match phase {
            SocketState::Open => {
                state.phase = SocketState::Closing;
                let active = state.active.take();
                tracing::info!(socket = %state.url, "Closing socket");
                drop(state);

                self.subscribable.dispatch(SocketEvent::Closing);
                if let Some(active) = active {
                    let _ = active.outbound.send(Outbound::Close);
                }
                lock(&self.state).phase = SocketState::Closed;
                self.subscribable.dispatch(SocketEvent::Close(CloseInfo::normal()));
            }
            SocketState::Opening => {
                state.phase = SocketState::Closed;
                state.generation += 1;
                tracing::info!(socket = %state.url, "Abandoned connect");
                drop(state);
                self.cancel.notify_waiters();
            }
            SocketState::Closed | SocketState::Closing => {}
        }
    }

    fn send(&self, message: Message) {
        let mut state = lock(&self.state);
        let phase = state.phase;
        match phase {
            SocketState::Opening => state.queue.push(message),
            SocketState::Open => {
                let sent = state
                    .active
                    .as_ref()
                    .is_some_and(|active| active.outbound.send(Outbound::Send(message.clone())).is_ok());
                let url = state.url.clone();
                drop(state);

                if sent {
                    self.subscribable.dispatch(SocketEvent::Request(message));
                } else {
                    tracing::warn!(socket = %url, "Transport gone, message dropped");
                    self.subscribable
                        .dispatch(SocketEvent::Error(Arc::new(Error::NotConnected)));
                }
            }
            SocketState::Closed | SocketState::Closing => {
                tracing::warn!(
                    socket = %state.url,
                    state = %phase,
                    bytes = message.len(),
                    "Send on inactive socket dropped"
                );
            }
        }
    }
}

impl Lifecycle for Inner {
    fn on_zero_subscriptions(&self) {
        self.close();
    }
}

async fn read_loop(
    inner: Weak<Inner>,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    generation: u64,
) {
    while let Some(event) = inbound.recv().await {
        let Some(socket) = inner.upgrade() else {
            return;
        };
        match event {
            TransportEvent::Message(message) => {
                if socket.is_active(generation) {
                    socket.subscribable.dispatch(SocketEvent::Response(message));
                }
            }
            TransportEvent::Error(reason) => {
                if socket.is_active(generation) {
                    tracing::warn!(generation, reason = %reason, "Transport error");
                    socket
                        .subscribable
                        .dispatch(SocketEvent::Error(Arc::new(Error::Transport(reason))));
                }
            }
            TransportEvent::Closed {
                code,
                reason,
                was_clean,
            } => {
                socket.transport_closed(
                    generation,
                    CloseInfo {
                        code,
                        reason,
                        was_clean,
                    },
                );
                return;
            }
        }
    }

    // The transport went away without saying goodbye
    if let Some(socket) = inner.upgrade() {
        socket.transport_closed(
            generation,
            CloseInfo {
                code: CLOSE_ABNORMAL,
                reason: "connection lost".to_string(),
                was_clean: false,
            },
        );
    }
}
