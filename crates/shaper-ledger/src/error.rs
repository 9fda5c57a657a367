//! Error types for shaper-ledger.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Order not found: {0}")]
    NotFound(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
