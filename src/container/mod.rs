//! Bounded, pausable containers that publish their changes
//!
//! ```text
//!   upstream ──► SubscriptionContainer ──► SubscriberContainer ──► subscribers
//!                                               │
//!                                       StatefulContainer (running | queued)
//!                                               │
//!                                          Container ──► Buffer
//! ```
//!
//! [`DisplayContainer`] is a separate three-lane variant with its own event
//! set.

pub mod bounded;
pub mod config;
pub mod display;
pub mod stateful;
pub mod subscriber;
pub mod subscription;
pub mod upstream;

pub use bounded::Container;
pub use config::{ContainerConfig, DEFAULT_MAX_QUEUE_SIZE};
pub use display::{DisplayContainer, DisplayEvent, DisplayStatus, Lane};
pub use stateful::{StatefulContainer, Status, Transaction, TransactionKind};
pub use subscriber::{ContainerEvent, SubscriberContainer};
pub use subscription::SubscriptionContainer;
pub use upstream::UpstreamHandler;
