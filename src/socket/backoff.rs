//! Exponential connect backoff

use std::time::Duration;

use super::config::BackoffConfig;

/// Delay schedule for one run of connect attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            config: config.clone(),
            attempts: 0,
            delay: config.initial_delay,
        }
    }

    /// Failed attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and return how long to wait before the next
    ///
    /// Returns None when the policy gives up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if !self.config.retry_on_error {
            return None;
        }
        if let Some(max) = self.config.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }

        let delay = self.delay.min(self.config.max_delay);
        self.delay = self
            .delay
            .mul_f64(self.config.multiplier)
            .min(self.config.max_delay);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_grows_until_cap() {
        let config = BackoffConfig::new()
            .initial_delay(ms(100))
            .multiplier(3.0)
            .max_delay(ms(1000));
        let mut backoff = Backoff::new(&config);

        let delays: Vec<_> = (0..5).filter_map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, vec![ms(100), ms(300), ms(900), ms(1000), ms(1000)]);
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn test_no_retry_gives_up_immediately() {
        let mut backoff = Backoff::new(&BackoffConfig::new().no_retry());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 1);
    }

    #[test]
    fn test_max_attempts() {
        let mut backoff = Backoff::new(&BackoffConfig::new().max_attempts(3));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
    }
}
