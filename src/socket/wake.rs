//! Sleep/wake detection
//!
//! A ticker compares wall-clock progress against the tick interval. When the
//! host was suspended the monotonic timer stalls with it, so the first tick
//! after resume sees far more wall-clock time than one interval.

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::subscribable::{lock, Lifecycle, Subscribable, SubscribableEvent, Subscription};

/// Detector configuration
#[derive(Debug, Clone)]
pub struct SleepWakeConfig {
    /// Tick interval
    pub interval: Duration,

    /// Extra wall-clock time per tick tolerated before reporting a wake
    pub threshold: Duration,
}

impl Default for SleepWakeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            threshold: Duration::from_secs(10),
        }
    }
}

impl SleepWakeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Time the host was away, if `elapsed` wall-clock time for one tick
    /// exceeds the tolerance
    pub fn gap(&self, elapsed: Duration) -> Option<Duration> {
        (elapsed > self.interval + self.threshold).then(|| elapsed - self.interval)
    }
}

/// Event dispatched by [`SleepWakeDetector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeEvent {
    /// The host resumed after roughly `gap`
    Wake { gap: Duration },
}

impl SubscribableEvent for WakeEvent {
    fn event_type(&self) -> &'static str {
        "wake"
    }
}

struct Inner {
    subscribable: Subscribable<WakeEvent>,
    config: SleepWakeConfig,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// Dispatches `wake` after the host resumes from suspend
///
/// The ticker only runs while the detector has subscribers. Clones share the
/// same ticker.
#[derive(Clone)]
pub struct SleepWakeDetector {
    inner: Arc<Inner>,
}

impl Default for SleepWakeDetector {
    fn default() -> Self {
        Self::new(SleepWakeConfig::default())
    }
}

impl std::fmt::Debug for SleepWakeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SleepWakeDetector")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SleepWakeDetector {
    pub fn new(config: SleepWakeConfig) -> Self {
        let inner = Arc::new(Inner {
            subscribable: Subscribable::new("SleepWakeDetector"),
            config,
            ticker: Mutex::new(None),
        });
        let hooks: Weak<dyn Lifecycle> = Arc::downgrade(&inner) as Weak<dyn Lifecycle>;
        inner.subscribable.set_lifecycle(hooks);
        Self { inner }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription<WakeEvent>
    where
        F: Fn(&WakeEvent) + Send + Sync + 'static,
    {
        self.inner.subscribable.subscribe(callback)
    }

    pub fn subscribable(&self) -> &Subscribable<WakeEvent> {
        &self.inner.subscribable
    }

    /// Whether the ticker task is alive
    pub fn is_running(&self) -> bool {
        lock(&self.inner.ticker)
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }

    /// Report a wake detected by other means
    pub fn notify_wake(&self) {
        tracing::info!("Wake signalled");
        self.inner
            .subscribable
            .dispatch(WakeEvent::Wake { gap: Duration::ZERO });
    }
}

impl Inner {
    fn stop(&self) {
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.abort();
            tracing::debug!("Stopped sleep/wake ticker");
        }
    }
}

impl Lifecycle for Inner {
    fn on_first_subscription(&self, _args: Option<&()>) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No tokio runtime, sleep/wake detection disabled");
                return;
            }
        };
        let ticker = handle.spawn(tick(self.subscribable.clone(), self.config.clone()));
        if let Some(previous) = lock(&self.ticker).replace(ticker) {
            previous.abort();
        }
        tracing::debug!(interval_ms = self.config.interval.as_millis() as u64, "Started sleep/wake ticker");
    }

    fn on_zero_subscriptions(&self) {
        self.stop();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick(subscribable: Subscribable<WakeEvent>, config: SleepWakeConfig) {
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    let mut last = SystemTime::now();
    loop {
        interval.tick().await;
        let now = SystemTime::now();
        // A clock set backwards reads as no time passing
        let elapsed = now.duration_since(last).unwrap_or_default();
        last = now;

        if let Some(gap) = config.gap(elapsed) {
            tracing::info!(gap_ms = gap.as_millis() as u64, "Wake detected");
            subscribable.dispatch(WakeEvent::Wake { gap });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::testing::settle;

    #[test]
    fn test_gap_threshold() {
        let config = SleepWakeConfig::new()
            .interval(Duration::from_secs(1))
            .threshold(Duration::from_secs(4));

        assert_eq!(config.gap(Duration::from_secs(1)), None);
        assert_eq!(config.gap(Duration::from_secs(5)), None);
        assert_eq!(config.gap(Duration::from_secs(30)), Some(Duration::from_secs(29)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_follows_subscribers() {
        let detector = SleepWakeDetector::default();
        assert!(!detector.is_running());

        let first = detector.subscribe(|_| {});
        let second = detector.subscribe(|_| {});
        settle().await;
        assert!(detector.is_running());

        drop(first);
        assert!(detector.is_running());
        drop(second);
        assert!(!detector.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_ticks_stay_quiet() {
        let detector = SleepWakeDetector::new(
            SleepWakeConfig::new()
                .interval(Duration::from_millis(100))
                .threshold(Duration::from_secs(60)),
        );
        let wakes = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&wakes);
        let _sub = detector.subscribe(move |_| *sink.lock().unwrap() += 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*wakes.lock().unwrap(), 0);
    }

    #[test]
    fn test_notify_wake() {
        let detector = SleepWakeDetector::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = detector.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        detector.notify_wake();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![WakeEvent::Wake { gap: Duration::ZERO }]
        );
        assert!(!detector.is_running());
    }
}
