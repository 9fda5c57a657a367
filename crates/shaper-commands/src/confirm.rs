//! Confirmation state machine.
//!
//! `Idle → Pending(raw, deadline) → Idle`, owned by the command
//! processor. A pending command is consumed exactly once; after the
//! deadline the prompt silently expires.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// How long a confirmation prompt stays valid.
const CONFIRM_TIMEOUT_SECS: i64 = 600;

#[derive(Debug, Clone)]
struct Pending {
    raw: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Confirmation {
    pending: Mutex<Option<Pending>>,
}

impl Confirmation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `raw` for a later `y`.
    pub fn request(&self, raw: &str) {
        *self.pending.lock() = Some(Pending {
            raw: raw.to_string(),
            expires_at: Utc::now() + Duration::seconds(CONFIRM_TIMEOUT_SECS),
        });
    }

    /// Consume the pending command, if any and not expired. The state
    /// returns to idle either way, so a second take yields nothing.
    pub fn take(&self) -> Option<String> {
        let pending = self.pending.lock().take()?;
        if Utc::now() > pending.expires_at {
            return None;
        }
        Some(pending.raw)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_consumes_once() {
        let confirmation = Confirmation::new();
        confirmation.request("clear all force");

        assert_eq!(confirmation.take().as_deref(), Some("clear all force"));
        // Second take: nothing pending
        assert!(confirmation.take().is_none());
        assert!(!confirmation.is_pending());
    }

    #[test]
    fn test_new_request_replaces_old() {
        let confirmation = Confirmation::new();
        confirmation.request("first");
        confirmation.request("second");
        assert_eq!(confirmation.take().as_deref(), Some("second"));
    }

    #[test]
    fn test_expired_prompt_yields_nothing() {
        let confirmation = Confirmation::new();
        confirmation.request("stale");
        // Force the deadline into the past
        confirmation.pending.lock().as_mut().unwrap().expires_at =
            Utc::now() - Duration::seconds(1);
        assert!(confirmation.take().is_none());
    }
}
