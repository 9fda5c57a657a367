//! Error types for shaper-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid pair: {0}")]
    InvalidPair(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid purpose tag: {0}")]
    InvalidPurpose(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
