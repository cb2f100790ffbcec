//! Socket configuration

use std::time::Duration;

/// How inbound payloads are surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryType {
    /// Deliver [`Message::Binary`](super::Message::Binary)
    #[default]
    Binary,
    /// Decode as UTF-8 (lossy) and deliver [`Message::Text`](super::Message::Text)
    Text,
}

/// Connect retry policy
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Growth factor applied after every failed attempt
    pub multiplier: f64,

    /// Upper bound for a single delay
    pub max_delay: Duration,

    /// Retry failed connects at all
    pub retry_on_error: bool,

    /// Total attempts before giving up (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            retry_on_error: true,
            max_attempts: None,
        }
    }
}

impl BackoffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the growth factor (values below 1.0 are raised to 1.0)
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the delay cap
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Give up after the first failed attempt
    pub fn no_retry(mut self) -> Self {
        self.retry_on_error = false;
        self
    }

    /// Cap the number of attempts
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }
}

/// Socket configuration options
#[derive(Debug, Clone, Default)]
pub struct SocketConfig {
    /// How inbound payloads are surfaced
    pub binary_type: BinaryType,

    /// Connect retry policy
    pub backoff: BackoffConfig,
}

impl SocketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inbound payload type
    pub fn binary_type(mut self, binary_type: BinaryType) -> Self {
        self.binary_type = binary_type;
        self
    }

    /// Set the retry policy
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}
