//! Trading pair identifier.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A spot trading pair, e.g. `ADM/USDT`.
///
/// Coins are stored upper-cased so pairs compare and hash consistently
/// regardless of how the operator typed them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = CoreError;

    /// Accepts `BASE/QUOTE`, `BASE_QUOTE`, and `BASE-QUOTE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ['/', '_', '-']);
        let base = parts.next().unwrap_or_default().trim();
        let quote = parts.next().unwrap_or_default().trim();
        if base.is_empty() || quote.is_empty() {
            return Err(CoreError::InvalidPair(s.to_string()));
        }
        Ok(Self::new(base, quote))
    }
}
