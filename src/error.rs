//! Error types
//!
//! Transport failures never escape the socket as `Err`; they are reported as
//! events. These types cross the [`Connector`](crate::socket::Connector) seam
//! and the few fallible helpers around it.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type
#[derive(Debug)]
pub enum Error {
    /// The transport refused or dropped the connection
    Transport(String),
    /// Underlying I/O error
    Io(io::Error),
    /// A payload could not be serialized for sending
    Serialize(serde_json::Error),
    /// An operation required an open connection
    NotConnected,
    /// The connect backoff gave up
    RetriesExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(reason) => write!(f, "Transport error: {}", reason),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serialize(e) => write!(f, "Serialization error: {}", e),
            Error::NotConnected => write!(f, "Not connected"),
            Error::RetriesExhausted { attempts } => {
                write!(f, "Gave up connecting after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Serialize(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialize(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Error::NotConnected.to_string(), "Not connected");
        assert_eq!(
            Error::RetriesExhausted { attempts: 3 }.to_string(),
            "Gave up connecting after 3 attempts"
        );
        assert_eq!(
            Error::Transport("refused".into()).to_string(),
            "Transport error: refused"
        );
    }

    #[test]
    fn test_from_io() {
        let err: Error = io::Error::new(io::ErrorKind::ConnectionRefused, "nope").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
