//! Operator command surface.
//!
//! A whitespace-delimited text protocol: the parser turns input into a
//! typed [`Command`], the processor executes it against the engine, and
//! the formatter renders structured results into operator-facing text.
//! Destructive or large-notional commands go through the confirmation
//! state machine first.

pub mod confirm;
pub mod error;
pub mod format;
pub mod parser;
pub mod processor;

pub use confirm::Confirmation;
pub use error::{CommandError, CommandResult};
pub use parser::{ClearTarget, Command, ParsedCommand, Subsystem};
pub use processor::{CommandOutcome, CommandProcessor};
