//! Message sockets with queued sends, backoff and reconnects
//!
//! [`Socket`] is the connection state machine. [`ReconnectingSocket`] wraps
//! one and swaps in a fresh socket after an unclean close or a host wake-up.
//! Both talk to the network through a [`Connector`]; [`TcpConnector`] is the
//! bundled implementation.

pub mod backoff;
pub mod config;
pub mod message;
pub mod reconnecting;
#[allow(clippy::module_inception)]
pub mod socket;
pub mod tcp;
pub mod transport;
pub mod wake;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::Backoff;
pub use config::{BackoffConfig, BinaryType, SocketConfig};
pub use message::Message;
pub use reconnecting::{ReconnectingSocket, ReconnectingSocketEvent, ReconnectingState};
pub use socket::{CloseInfo, Socket, SocketEvent, SocketState, CLOSE_ABNORMAL, CLOSE_NORMAL};
pub use tcp::TcpConnector;
pub use transport::{
    ConnectFuture, Connection, ConnectionPeer, Connector, Outbound, PeerSender, TransportEvent,
};
pub use wake::{SleepWakeConfig, SleepWakeDetector, WakeEvent};
