//! Purpose/time-window statistics over the ledger.

use crate::store::OrderLedger;
use chrono::{Duration, Utc};
use serde::Serialize;
use shaper_core::{Amount, Pair, Purpose};
use std::fmt;

/// Aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsWindow {
    Hour,
    Day,
    Month,
    All,
}

impl StatsWindow {
    fn duration(&self) -> Option<Duration> {
        match self {
            Self::Hour => Some(Duration::hours(1)),
            Self::Day => Some(Duration::days(1)),
            Self::Month => Some(Duration::days(30)),
            Self::All => None,
        }
    }
}

impl fmt::Display for StatsWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
            Self::Month => write!(f, "month"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Aggregated figures for one purpose.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurposeStats {
    pub orders: usize,
    pub filled: usize,
    pub base_volume: Amount,
    pub quote_volume: Amount,
}

impl OrderLedger {
    /// Aggregate rows by purpose within a window. Volume counts filled
    /// quantities only, so partially filled rows contribute their
    /// executed portion.
    pub fn stats_by_purpose(
        &self,
        pair: &Pair,
        purposes: &[Purpose],
        window: StatsWindow,
    ) -> Vec<(Purpose, PurposeStats)> {
        let cutoff = window.duration().map(|d| Utc::now() - d);
        let mut out: Vec<(Purpose, PurposeStats)> = purposes
            .iter()
            .map(|p| (*p, PurposeStats::default()))
            .collect();

        for order in self.all_orders() {
            if order.pair != *pair {
                continue;
            }
            if let Some(cutoff) = cutoff {
                if order.created_at < cutoff {
                    continue;
                }
            }
            if let Some((_, stats)) = out.iter_mut().find(|(p, _)| *p == order.purpose) {
                stats.orders += 1;
                if order.executed {
                    stats.filled += 1;
                }
                stats.base_volume = stats.base_volume + order.base_filled;
                stats.quote_volume = stats.quote_volume + order.quote_filled;
            }
        }
        out
    }
}
