//! # livefeed
//!
//! Reactive plumbing for live, frequently-updated collections delivered to
//! many independent observers.
//!
//! The crate is organised leaf-first:
//!
//! ```text
//!   socket::ReconnectingSocket ──► socket::Socket ──► Connector (tcp, ...)
//!            │
//!            ▼ events
//!   container::SubscriptionContainer / DisplayContainer
//!            │
//!            ▼
//!   container::StatefulContainer ──► container::Container ──► buffer::Buffer
//!            │
//!            ▼ transactions
//!   subscribable::Subscribable ──► subscribers
//! ```
//!
//! - [`subscribable`]: the notification primitive, multiplexer, field tracker
//! - [`buffer`]: four buffer strategies with diff-producing `replace`
//! - [`container`]: bounded, pausable containers that publish transactions
//! - [`socket`]: a transport state machine with queuing and reconnects

pub mod buffer;
pub mod container;
pub mod error;
pub mod socket;
pub mod subscribable;

pub use buffer::{
    ArrayBuffer, Buffer, ContainerElement, LinkListBuffer, PushType, UniqueArrayBuffer,
    UniqueSortedArrayBuffer,
};
pub use container::{
    Container, ContainerConfig, ContainerEvent, DisplayContainer, StatefulContainer,
    SubscriberContainer, SubscriptionContainer,
};
pub use error::{Error, Result};
pub use socket::{
    Connector, Message, ReconnectingSocket, ReconnectingSocketEvent, Socket, SocketConfig,
    SocketEvent, TcpConnector,
};
pub use subscribable::{
    ExtendedSubscription, Subscribable, SubscribableEvent, SubscribableMultiplexer,
    SubscriberId, Subscription,
};
