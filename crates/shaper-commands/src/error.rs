//! Error types for shaper-commands.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    /// Malformed operator input; the message carries a usage example
    /// and is returned synchronously.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Engine(#[from] shaper_engine::EngineError),

    #[error(transparent)]
    Exchange(#[from] shaper_exchange::ExchangeError),

    #[error(transparent)]
    Ledger(#[from] shaper_ledger::LedgerError),
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;
