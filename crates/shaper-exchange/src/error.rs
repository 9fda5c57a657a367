//! Exchange error taxonomy.
//!
//! Three recoverable classes drive the engine's retry behavior:
//! transient failures are retried on the next tick, rejections are
//! skipped locally, and unknown-order results feed the reconciler's
//! two-strike rule.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Network, rate-limit, 5xx, or deadline. Retried next tick.
    #[error("Transient API error: {0}")]
    Transient(String),

    /// Insufficient balance, min-amount, precision, self-trade
    /// prevention. Skipped locally.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Order id not recognized by the exchange.
    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    /// Pair not listed, bad credentials. Disables activity.
    #[error("Fatal exchange error: {0}")]
    Fatal(String),
}

impl ExchangeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
