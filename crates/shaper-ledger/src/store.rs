//! JSON Lines order store.
//!
//! Append-mode journal: every insert or update writes the full row as
//! one JSON line and flushes. On open the journal is replayed and the
//! last line per internal id wins, so partial corruption only affects
//! individual lines and interrupted writes cannot lose earlier state.

use crate::error::LedgerResult;
use dashmap::DashMap;
use parking_lot::Mutex;
use shaper_core::{Order, OrderId, Pair, Purpose};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persistent store of every order the agent has placed.
pub struct OrderLedger {
    path: PathBuf,
    index: DashMap<OrderId, Order>,
    writer: Mutex<BufWriter<File>>,
}

impl OrderLedger {
    /// Open (or create) the ledger at `path`, replaying the journal.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let index = DashMap::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let mut lines = 0usize;
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Order>(&line) {
                    Ok(order) => {
                        index.insert(order.id.clone(), order);
                        lines += 1;
                    }
                    Err(e) => warn!(?e, "Skipping corrupt ledger line"),
                }
            }
            info!(path = %path.display(), lines, orders = index.len(), "Ledger replayed");
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            index,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn persist(&self, order: &Order) -> LedgerResult<()> {
        let json = serde_json::to_string(order)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{json}")?;
        writer.flush()?;
        Ok(())
    }

    /// Insert a new row.
    pub fn insert(&self, order: Order) -> LedgerResult<()> {
        debug!(id = %order.id, purpose = %order.purpose, "Ledger insert");
        self.persist(&order)?;
        self.index.insert(order.id.clone(), order);
        Ok(())
    }

    /// Atomic single-row update: apply `patch` to the current row and
    /// persist the result. Idempotent under retry; re-applying the
    /// same patch journals the same state again.
    pub fn update<F>(&self, id: &OrderId, patch: F) -> LedgerResult<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut entry = self
            .index
            .get_mut(id)
            .ok_or_else(|| crate::error::LedgerError::NotFound(id.to_string()))?;
        patch(entry.value_mut());
        let updated = entry.value().clone();
        drop(entry);
        self.persist(&updated)?;
        Ok(updated)
    }

    pub fn find_by_id(&self, id: &OrderId) -> Option<Order> {
        self.index.get(id).map(|e| e.value().clone())
    }

    /// Row whose exchange id matches, if any.
    pub fn find_by_exchange_id(&self, exchange_id: &str) -> Option<Order> {
        self.index
            .iter()
            .find(|e| e.exchange_id.as_deref() == Some(exchange_id))
            .map(|e| e.value().clone())
    }

    /// Open orders for a pair, optionally restricted to one purpose.
    pub fn find_open(&self, purpose: Option<Purpose>, pair: &Pair) -> Vec<Order> {
        self.index
            .iter()
            .filter(|e| {
                e.is_open()
                    && e.pair == *pair
                    && purpose.map(|p| e.purpose == p).unwrap_or(true)
            })
            .map(|e| e.value().clone())
            .collect()
    }

    /// All open orders for a pair.
    pub fn open_orders(&self, pair: &Pair) -> Vec<Order> {
        self.find_open(None, pair)
    }

    /// Every row, open and closed. Statistics iterate this.
    pub fn all_orders(&self) -> Vec<Order> {
        self.index.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shaper_core::{Amount, CloseCause, OrderSide, Price};
    use tempfile::TempDir;

    fn pair() -> Pair {
        Pair::new("ADM", "USDT")
    }

    fn sample(purpose: Purpose) -> Order {
        Order::new_limit(
            pair(),
            OrderSide::Buy,
            purpose,
            Price::new(dec!(100)),
            Amount::new(dec!(1)),
        )
    }

    #[test]
    fn test_insert_and_find() {
        let dir = TempDir::new().unwrap();
        let ledger = OrderLedger::open(dir.path().join("orders.jsonl")).unwrap();

        let order = sample(Purpose::Ob);
        let id = order.id.clone();
        ledger.insert(order).unwrap();

        assert!(ledger.find_by_id(&id).is_some());
        assert_eq!(ledger.find_open(Some(Purpose::Ob), &pair()).len(), 1);
        assert!(ledger.find_open(Some(Purpose::Liq), &pair()).is_empty());
    }

    #[test]
    fn test_update_persists_last_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.jsonl");

        let id = {
            let ledger = OrderLedger::open(&path).unwrap();
            let order = sample(Purpose::Ob);
            let id = order.id.clone();
            ledger.insert(order).unwrap();
            ledger
                .update(&id, |o| o.close(CloseCause::Expired))
                .unwrap();
            id
        };

        // Reopen: the close survived the restart
        let ledger = OrderLedger::open(&path).unwrap();
        let order = ledger.find_by_id(&id).unwrap();
        assert!(order.closed);
        assert_eq!(order.close_cause, Some(CloseCause::Expired));
        assert!(ledger.open_orders(&pair()).is_empty());
    }

    #[test]
    fn test_update_missing_row_errors() {
        let dir = TempDir::new().unwrap();
        let ledger = OrderLedger::open(dir.path().join("orders.jsonl")).unwrap();
        let missing = OrderId::new();
        assert!(ledger.update(&missing, |_| {}).is_err());
    }

    #[test]
    fn test_corrupt_line_skipped_on_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.jsonl");

        {
            let ledger = OrderLedger::open(&path).unwrap();
            ledger.insert(sample(Purpose::Man)).unwrap();
        }
        // Append garbage, as an interrupted write would leave
        {
            use std::io::Write as _;
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "{{not json").unwrap();
        }

        let ledger = OrderLedger::open(&path).unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_find_by_exchange_id() {
        let dir = TempDir::new().unwrap();
        let ledger = OrderLedger::open(dir.path().join("orders.jsonl")).unwrap();

        let mut order = sample(Purpose::Liq);
        order.mark_placed("p42");
        let id = order.id.clone();
        ledger.insert(order).unwrap();

        assert_eq!(ledger.find_by_exchange_id("p42").unwrap().id, id);
        assert!(ledger.find_by_exchange_id("p999").is_none());
    }
}
