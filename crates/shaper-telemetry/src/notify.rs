//! Operator notification sinks.
//!
//! Components report through the [`Notifier`] trait; the host wires a
//! real delivery channel. [`ThrottledNotifier`] enforces the
//! at-most-hourly cadence used for repeating warnings (balance
//! shortfalls, persistent transient errors).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyType {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotifyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Notification delivery contract.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotifyType, message: &str);
}

/// Routes notifications into the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, kind: NotifyType, message: &str) {
        match kind {
            NotifyType::Info => info!(target: "notify", "{message}"),
            NotifyType::Warning => warn!(target: "notify", "{message}"),
            NotifyType::Error => error!(target: "notify", "{message}"),
        }
    }
}

/// Wrapper that delivers a given key at most once per period.
pub struct ThrottledNotifier {
    inner: Arc<dyn Notifier>,
    period: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl ThrottledNotifier {
    /// Hourly throttle, the cadence for repeating warnings.
    pub fn hourly(inner: Arc<dyn Notifier>) -> Self {
        Self::new(inner, Duration::from_secs(3600))
    }

    pub fn new(inner: Arc<dyn Notifier>, period: Duration) -> Self {
        Self {
            inner,
            period,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver unless the same `key` fired within the period. Returns
    /// whether the notification went out.
    pub fn notify_throttled(&self, key: &str, kind: NotifyType, message: &str) -> bool {
        let mut last_sent = self.last_sent.lock();
        if let Some(last) = last_sent.get(key) {
            if last.elapsed() < self.period {
                return false;
            }
        }
        last_sent.insert(key.to_string(), Instant::now());
        drop(last_sent);
        self.inner.notify(kind, message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        count: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, _kind: NotifyType, _message: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_throttle_suppresses_repeats() {
        let counter = Arc::new(CountingNotifier::default());
        let throttled =
            ThrottledNotifier::new(counter.clone(), Duration::from_secs(3600));

        assert!(throttled.notify_throttled("low-balance", NotifyType::Warning, "low"));
        assert!(!throttled.notify_throttled("low-balance", NotifyType::Warning, "low"));
        // Different key is delivered
        assert!(throttled.notify_throttled("other", NotifyType::Warning, "x"));
        assert_eq!(counter.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_throttle_expires() {
        let counter = Arc::new(CountingNotifier::default());
        let throttled = ThrottledNotifier::new(counter.clone(), Duration::from_millis(0));
        assert!(throttled.notify_throttled("k", NotifyType::Info, "a"));
        assert!(throttled.notify_throttled("k", NotifyType::Info, "b"));
        assert_eq!(counter.count.load(Ordering::SeqCst), 2);
    }
}
