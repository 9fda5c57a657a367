//! Freshness-stamped caches that bound API pressure.
//!
//! Each cache is a key to `(value, stamped_at)` mapping with a single
//! refresh path. Mutating operations on a pair invalidate eagerly; reads
//! refresh lazily after the TTL. Locks are never held across an adapter
//! call.

use crate::api::ExchangeApi;
use crate::error::ExchangeResult;
use dashmap::DashMap;
use parking_lot::RwLock;
use shaper_core::{AccountSnapshot, MarketInfo, OrderBook, Pair};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Stamped<T> {
    value: T,
    stamped_at: Instant,
}

impl<T> Stamped<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            stamped_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.stamped_at.elapsed() < ttl
    }
}

/// Account balance cache: single writer (the refresh path), many
/// readers. Refreshed lazily after a short TTL and invalidated eagerly
/// after any successful placement or cancellation.
pub struct BalanceCache {
    api: Arc<dyn ExchangeApi>,
    ttl: Duration,
    inner: RwLock<Option<Stamped<AccountSnapshot>>>,
}

impl BalanceCache {
    pub fn new(api: Arc<dyn ExchangeApi>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// Current snapshot, refreshing when stale.
    pub async fn get(&self) -> ExchangeResult<AccountSnapshot> {
        if let Some(stamped) = self.inner.read().as_ref() {
            if stamped.is_fresh(self.ttl) {
                return Ok(stamped.value.clone());
            }
        }
        let entries = self.api.get_balances(false).await?;
        let snapshot = AccountSnapshot::new(entries);
        *self.inner.write() = Some(Stamped::new(snapshot.clone()));
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next read refreshes.
    pub fn invalidate(&self) {
        *self.inner.write() = None;
    }
}

/// Order-book cache keyed by pair.
pub struct BookCache {
    api: Arc<dyn ExchangeApi>,
    ttl: Duration,
    books: DashMap<Pair, Stamped<OrderBook>>,
}

impl BookCache {
    pub fn new(api: Arc<dyn ExchangeApi>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            books: DashMap::new(),
        }
    }

    pub async fn get(&self, pair: &Pair) -> ExchangeResult<OrderBook> {
        if let Some(stamped) = self.books.get(pair) {
            if stamped.is_fresh(self.ttl) {
                return Ok(stamped.value.clone());
            }
        }
        let book = self.api.get_order_book(pair).await?;
        self.books.insert(pair.clone(), Stamped::new(book.clone()));
        Ok(book)
    }

    pub fn invalidate(&self, pair: &Pair) {
        self.books.remove(pair);
    }
}

/// Market descriptors, loaded once per exchange and reused.
pub struct MarketsCache {
    api: Arc<dyn ExchangeApi>,
    markets: RwLock<Option<HashMap<Pair, MarketInfo>>>,
}

impl MarketsCache {
    pub fn new(api: Arc<dyn ExchangeApi>) -> Self {
        Self {
            api,
            markets: RwLock::new(None),
        }
    }

    pub async fn get(&self, pair: &Pair) -> ExchangeResult<Option<MarketInfo>> {
        if let Some(markets) = self.markets.read().as_ref() {
            return Ok(markets.get(pair).cloned());
        }
        let loaded = self.api.load_markets().await?;
        let found = loaded.get(pair).cloned();
        *self.markets.write() = Some(loaded);
        Ok(found)
    }
}
