//! Transport seam
//!
//! A [`Connector`] turns a URL into a [`Connection`]: a pair of unbounded
//! channels, one carrying [`Outbound`] commands to the transport task and
//! one carrying [`TransportEvent`]s back. The socket state machine only ever
//! talks to these channels, so any message-oriented transport (TCP, a
//! websocket library, an in-memory peer in tests) can sit behind it.
//!
//! ```text
//!   Socket ──Outbound::Send/Close──► transport task ──► wire
//!     ▲                                   │
//!     └──── TransportEvent::Message/Closed/Error
//! ```

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::config::SocketConfig;
use super::message::Message;

/// Reported by the transport task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame arrived
    Message(Message),
    /// The connection ended
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
    },
    /// A non-fatal transport error
    Error(String),
}

/// Commands for the transport task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Send(Message),
    Close,
}

/// The socket's end of an established connection
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Connection {
    /// Wrap channels owned by a transport task
    pub fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Create a connection together with the transport-side peer
    pub fn pair() -> (Connection, ConnectionPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Connection::new(outbound_tx, inbound_rx),
            ConnectionPeer {
                sender: PeerSender { inbound: inbound_tx },
                outbound: outbound_rx,
            },
        )
    }

    /// Hand a frame to the transport
    pub fn send(&self, message: Message) -> Result<()> {
        self.outbound
            .send(Outbound::Send(message))
            .map_err(|_| Error::NotConnected)
    }

    /// Ask the transport to shut down
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<Outbound>,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        (self.outbound, self.inbound)
    }
}

/// Cloneable handle for reporting transport events to the socket
#[derive(Debug, Clone)]
pub struct PeerSender {
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl PeerSender {
    /// Deliver a frame; false once the socket side is gone
    pub fn deliver(&self, message: impl Into<Message>) -> bool {
        self.inbound
            .send(TransportEvent::Message(message.into()))
            .is_ok()
    }

    /// Report the end of the connection
    pub fn close(&self, code: u16, reason: impl Into<String>, was_clean: bool) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code,
            reason: reason.into(),
            was_clean,
        });
    }

    pub fn error(&self, reason: impl Into<String>) {
        let _ = self.inbound.send(TransportEvent::Error(reason.into()));
    }

    /// Whether the socket side dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}

/// The transport's end of a [`Connection`] created with [`Connection::pair`]
#[derive(Debug)]
pub struct ConnectionPeer {
    sender: PeerSender,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl ConnectionPeer {
    pub fn deliver(&self, message: impl Into<Message>) -> bool {
        self.sender.deliver(message)
    }

    pub fn close(&self, code: u16, reason: impl Into<String>, was_clean: bool) {
        self.sender.close(code, reason, was_clean);
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.sender.error(reason);
    }

    /// Next command from the socket, None once the socket dropped it
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    pub fn sender(&self) -> PeerSender {
        self.sender.clone()
    }

    pub fn into_split(self) -> (PeerSender, mpsc::UnboundedReceiver<Outbound>) {
        (self.sender, self.outbound)
    }
}

/// Future returned by [`Connector::connect`]
pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Connection>> + Send>>;

/// Opens connections for a socket
pub trait Connector: Send + Sync + 'static {
    /// Start connecting to `url`
    ///
    /// The future resolves once the connection is usable. Dropping it
    /// abandons the attempt.
    fn connect(&self, url: &str, config: &SocketConfig) -> ConnectFuture;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_carries_both_directions() {
        let (connection, mut peer) = Connection::pair();

        connection.send(Message::from("ping")).unwrap();
        connection.close();
        assert_eq!(peer.recv().await, Some(Outbound::Send(Message::from("ping"))));
        assert_eq!(peer.recv().await, Some(Outbound::Close));

        assert!(peer.deliver("pong"));
        peer.close(1000, "bye", true);
        let (_outbound, mut inbound) = connection.into_parts();
        assert_eq!(
            inbound.recv().await,
            Some(TransportEvent::Message(Message::from("pong")))
        );
        assert_eq!(
            inbound.recv().await,
            Some(TransportEvent::Closed {
                code: 1000,
                reason: "bye".into(),
                was_clean: true
            })
        );
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (connection, peer) = Connection::pair();
        let sender = peer.sender();
        drop(peer);

        assert!(matches!(
            connection.send(Message::from("late")),
            Err(Error::NotConnected)
        ));
        drop(connection);
        assert!(sender.is_closed());
        assert!(!sender.deliver("nobody"));
    }
}
