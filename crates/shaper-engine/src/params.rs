//! Snapshot-read / exclusive-write store for [`TradeParams`].
//!
//! Written only by the command processor; every scheduler tick reads a
//! snapshot, so a mutation takes effect no later than the next tick of
//! each component. Mutations are persisted to disk before they are
//! visible to readers.

use crate::error::EngineResult;
use parking_lot::RwLock;
use shaper_core::TradeParams;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct ParamsStore {
    path: Option<PathBuf>,
    inner: RwLock<TradeParams>,
}

impl ParamsStore {
    /// Load from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let params = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(params) => {
                    info!(path = %path.display(), "Trade parameters loaded");
                    params
                }
                Err(e) => {
                    warn!(?e, "Corrupt params file, using defaults");
                    TradeParams::default()
                }
            },
            Err(_) => TradeParams::default(),
        };
        Self {
            path: Some(path),
            inner: RwLock::new(params),
        }
    }

    /// Non-persistent store (tests).
    pub fn in_memory(params: TradeParams) -> Self {
        Self {
            path: None,
            inner: RwLock::new(params),
        }
    }

    /// Lock-free-read snapshot of the current parameters.
    pub fn snapshot(&self) -> TradeParams {
        self.inner.read().clone()
    }

    /// Mutate and persist. The write lock is held only for the
    /// in-memory swap; the disk write happens on the updated clone.
    pub fn update<F>(&self, mutate: F) -> EngineResult<TradeParams>
    where
        F: FnOnce(&mut TradeParams),
    {
        let updated = {
            let mut guard = self.inner.write();
            mutate(&mut guard);
            guard.clone()
        };
        if let Some(path) = &self.path {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&updated)?)?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shaper_core::Amount;
    use tempfile::TempDir;

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.json");

        {
            let store = ParamsStore::load(&path);
            store
                .update(|p| {
                    p.is_active = true;
                    p.min_amount = Amount::new(dec!(5));
                })
                .unwrap();
        }

        let store = ParamsStore::load(&path);
        let params = store.snapshot();
        assert!(params.is_active);
        assert_eq!(params.min_amount.inner(), dec!(5));
    }

    #[test]
    fn test_in_memory_snapshot_isolated() {
        let store = ParamsStore::in_memory(TradeParams::default());
        let snapshot = store.snapshot();
        store.update(|p| p.is_active = true).unwrap();
        // Old snapshot is unaffected; a fresh one sees the change
        assert!(!snapshot.is_active);
        assert!(store.snapshot().is_active);
    }
}
