//! In-memory connector and event recorder shared by the socket tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Error;
use crate::subscribable::{Subscribable, SubscribableEvent, Subscription};

use super::config::SocketConfig;
use super::transport::{ConnectFuture, Connection, ConnectionPeer, Connector, Outbound, PeerSender};

#[derive(Default)]
struct MockState {
    urls: Vec<String>,
    fail_first: u32,
    delay: Duration,
    peers: Vec<ConnectionPeer>,
}

/// Connector that hands out [`Connection::pair`] ends and keeps the peers
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Refuse the first `n` attempts
    pub(crate) fn failing(self, n: u32) -> Self {
        self.state.lock().unwrap().fail_first = n;
        self
    }

    /// Take `delay` to resolve every attempt
    pub(crate) fn delayed(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = delay;
        self
    }

    pub(crate) fn attempts(&self) -> usize {
        self.state.lock().unwrap().urls.len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.state.lock().unwrap().urls.clone()
    }

    pub(crate) fn connections(&self) -> usize {
        self.state.lock().unwrap().peers.len()
    }

    /// Transport side of the `index`-th established connection
    pub(crate) fn peer(&self, index: usize) -> PeerSender {
        self.state.lock().unwrap().peers[index].sender()
    }

    /// Commands received so far by the `index`-th connection
    pub(crate) fn sent(&self, index: usize) -> Vec<Outbound> {
        let mut state = self.state.lock().unwrap();
        let peer = &mut state.peers[index];
        std::iter::from_fn(|| peer.try_recv()).collect()
    }

    /// Drop every peer without a close event
    pub(crate) fn drop_peers(&self) {
        self.state.lock().unwrap().peers.clear();
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: &str, _config: &SocketConfig) -> ConnectFuture {
        let state = Arc::clone(&self.state);
        let url = url.to_string();
        Box::pin(async move {
            let (delay, fail) = {
                let mut state = state.lock().unwrap();
                state.urls.push(url);
                let fail = state.fail_first > 0;
                if fail {
                    state.fail_first -= 1;
                }
                (state.delay, fail)
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(Error::Transport("connection refused".into()));
            }

            let (connection, peer) = Connection::pair();
            state.lock().unwrap().peers.push(peer);
            Ok(connection)
        })
    }
}

pub(crate) type Events = Arc<Mutex<Vec<&'static str>>>;

/// Record the discriminant of every event
pub(crate) fn record<E: SubscribableEvent>(subscribable: &Subscribable<E>) -> (Events, Subscription<E>) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let subscription = subscribable.subscribe(move |event: &E| {
        sink.lock().unwrap().push(event.event_type());
    });
    (events, subscription)
}

/// Let spawned tasks run
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
