//! In-memory paper exchange.
//!
//! A deterministic [`ExchangeApi`] implementation backing paper-trading
//! runs and the integration tests: seedable book, rates, and balances;
//! funds are locked on placement and released on cancellation. Test
//! hooks simulate fills, partial fills, and orders vanishing from the
//! exchange side.

use crate::api::{
    CancelOutcome, ExchangeApi, Features, OpenOrder, OrderDetailStatus, OrderDetails,
    PlaceOrderRequest, PlaceOutcome,
};
use crate::error::{ExchangeError, ExchangeResult};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use shaper_core::{
    Amount, BalanceEntry, BookLevel, MarketInfo, OrderBook, OrderSide, Pair, Price, Rates,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaperStatus {
    Open,
    PartFilled,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    exchange_id: String,
    pair: Pair,
    side: OrderSide,
    price: Price,
    amount: Amount,
    executed: Amount,
    status: PaperStatus,
    /// Simulated disappearance: the exchange no longer knows the id.
    vanished: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct CoinFunds {
    free: Decimal,
    locked: Decimal,
}

/// Deterministic in-memory exchange.
pub struct PaperExchange {
    funds: RwLock<HashMap<String, CoinFunds>>,
    books: RwLock<HashMap<Pair, OrderBook>>,
    rates: RwLock<HashMap<Pair, Rates>>,
    markets: RwLock<HashMap<Pair, MarketInfo>>,
    orders: DashMap<String, PaperOrder>,
    next_id: AtomicU64,
    features: RwLock<Features>,
    /// Pending injected transient failures for place calls.
    place_failures: AtomicU32,
    /// Pending injected rejections for place calls.
    place_rejections: AtomicU32,
    /// Pending injected transient failures for cancel calls.
    cancel_failures: AtomicU32,
    /// Pending injected transient failures for order-detail calls.
    detail_failures: AtomicU32,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self {
            funds: RwLock::new(HashMap::new()),
            books: RwLock::new(HashMap::new()),
            rates: RwLock::new(HashMap::new()),
            markets: RwLock::new(HashMap::new()),
            orders: DashMap::new(),
            next_id: AtomicU64::new(1),
            features: RwLock::new(Features::default()),
            place_failures: AtomicU32::new(0),
            place_rejections: AtomicU32::new(0),
            cancel_failures: AtomicU32::new(0),
            detail_failures: AtomicU32::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Seeding and simulation hooks
    // ------------------------------------------------------------------

    pub fn set_balance(&self, coin: &str, free: Amount) {
        self.funds.write().insert(
            coin.to_uppercase(),
            CoinFunds {
                free: free.inner(),
                locked: Decimal::ZERO,
            },
        );
    }

    pub fn set_features(&self, features: Features) {
        *self.features.write() = features;
    }

    pub fn set_book(&self, pair: &Pair, book: OrderBook) {
        self.books.write().insert(pair.clone(), book);
        self.ensure_market(pair);
    }

    pub fn set_rates(&self, pair: &Pair, rates: Rates) {
        self.rates.write().insert(pair.clone(), rates);
    }

    pub fn set_market(&self, pair: &Pair, info: MarketInfo) {
        self.markets.write().insert(pair.clone(), info);
    }

    /// Seed a symmetric book around `mid` with `levels` per side spaced
    /// one tick apart, plus derived rates and a default market.
    pub fn seed_flat_book(
        &self,
        pair: &Pair,
        mid: Decimal,
        tick: Decimal,
        levels: usize,
        amount_per_level: Decimal,
    ) {
        let amount = Amount::new(amount_per_level);
        let bids = (1..=levels)
            .map(|i| BookLevel::new(Price::new(mid - tick * Decimal::from(i as u64)), amount))
            .collect();
        let asks = (1..=levels)
            .map(|i| BookLevel::new(Price::new(mid + tick * Decimal::from(i as u64)), amount))
            .collect();
        self.set_book(pair, OrderBook::new(bids, asks));
        self.set_rates(
            pair,
            Rates {
                bid: Price::new(mid - tick),
                ask: Price::new(mid + tick),
                last: Price::new(mid),
                high_24h: Price::new(mid * Decimal::new(11, 1)),
                low_24h: Price::new(mid * Decimal::new(9, 1)),
                volume_24h: Amount::new(Decimal::from(1000)),
                quote_volume_24h: Amount::new(Decimal::from(1000) * mid),
            },
        );
    }

    fn ensure_market(&self, pair: &Pair) {
        let mut markets = self.markets.write();
        markets.entry(pair.clone()).or_insert_with(|| MarketInfo {
            base: pair.base.clone(),
            quote: pair.quote.clone(),
            base_decimals: 8,
            quote_decimals: 8,
            min_amount: Amount::new(Decimal::new(1, 3)),
            max_amount: None,
            price_tick: Price::new(Decimal::new(1, 4)),
        });
    }

    /// Queue `n` transient failures for upcoming place calls.
    pub fn inject_place_failures(&self, n: u32) {
        self.place_failures.store(n, Ordering::SeqCst);
    }

    /// Queue `n` rejections for upcoming place calls, as a min-amount
    /// or self-trade guard would produce.
    pub fn inject_place_rejections(&self, n: u32) {
        self.place_rejections.store(n, Ordering::SeqCst);
    }

    /// Queue `n` transient failures for upcoming cancel calls.
    pub fn inject_cancel_failures(&self, n: u32) {
        self.cancel_failures.store(n, Ordering::SeqCst);
    }

    /// Queue `n` transient failures for upcoming order-detail calls.
    pub fn inject_detail_failures(&self, n: u32) {
        self.detail_failures.store(n, Ordering::SeqCst);
    }

    /// Fully fill an open order and settle funds.
    pub fn simulate_fill(&self, exchange_id: &str) {
        if let Some(mut order) = self.orders.get_mut(exchange_id) {
            let remaining = order.amount - order.executed;
            Self::settle(&mut self.funds.write(), &order, remaining);
            order.executed = order.amount;
            order.status = PaperStatus::Filled;
        }
    }

    /// Partially fill an open order by `base` units.
    pub fn simulate_partial_fill(&self, exchange_id: &str, base: Amount) {
        if let Some(mut order) = self.orders.get_mut(exchange_id) {
            let fill = base.min(order.amount - order.executed);
            Self::settle(&mut self.funds.write(), &order, fill);
            order.executed = order.executed + fill;
            order.status = if order.executed >= order.amount {
                PaperStatus::Filled
            } else {
                PaperStatus::PartFilled
            };
        }
    }

    /// Make an order disappear: the exchange stops recognizing the id.
    pub fn simulate_vanish(&self, exchange_id: &str) {
        if let Some(mut order) = self.orders.get_mut(exchange_id) {
            order.vanished = true;
        }
    }

    /// Exchange-side ids of all live orders (test inspection).
    pub fn live_order_ids(&self) -> Vec<String> {
        self.orders
            .iter()
            .filter(|o| {
                !o.vanished
                    && matches!(o.status, PaperStatus::Open | PaperStatus::PartFilled)
            })
            .map(|o| o.exchange_id.clone())
            .collect()
    }

    /// Place an order directly, bypassing balance checks. Used to stage
    /// "unknown" orders that are live on the exchange but absent from
    /// any ledger.
    pub fn inject_foreign_order(
        &self,
        pair: &Pair,
        side: OrderSide,
        price: Price,
        amount: Amount,
    ) -> String {
        let exchange_id = format!("p{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.orders.insert(
            exchange_id.clone(),
            PaperOrder {
                exchange_id: exchange_id.clone(),
                pair: pair.clone(),
                side,
                price,
                amount,
                executed: Amount::ZERO,
                status: PaperStatus::Open,
                vanished: false,
            },
        );
        exchange_id
    }

    // ------------------------------------------------------------------
    // Fund accounting
    // ------------------------------------------------------------------

    fn lock_for(
        funds: &mut HashMap<String, CoinFunds>,
        order_side: OrderSide,
        pair: &Pair,
        price: Price,
        base: Amount,
    ) -> Result<(), String> {
        let (coin, needed) = match order_side {
            OrderSide::Buy => (pair.quote.clone(), base.inner() * price.inner()),
            OrderSide::Sell => (pair.base.clone(), base.inner()),
        };
        let entry = funds.entry(coin.clone()).or_default();
        if entry.free < needed {
            return Err(format!("Not enough {coin}"));
        }
        entry.free -= needed;
        entry.locked += needed;
        Ok(())
    }

    fn unlock_remaining(funds: &mut HashMap<String, CoinFunds>, order: &PaperOrder) {
        let remaining = order.amount - order.executed;
        let (coin, value) = match order.side {
            OrderSide::Buy => (
                order.pair.quote.clone(),
                remaining.inner() * order.price.inner(),
            ),
            OrderSide::Sell => (order.pair.base.clone(), remaining.inner()),
        };
        let entry = funds.entry(coin).or_default();
        entry.locked -= value;
        entry.free += value;
    }

    /// Move `fill` base units from locked funds into the received coin.
    fn settle(funds: &mut HashMap<String, CoinFunds>, order: &PaperOrder, fill: Amount) {
        let quote_value = fill.inner() * order.price.inner();
        match order.side {
            OrderSide::Buy => {
                funds.entry(order.pair.quote.clone()).or_default().locked -= quote_value;
                funds.entry(order.pair.base.clone()).or_default().free += fill.inner();
            }
            OrderSide::Sell => {
                funds.entry(order.pair.base.clone()).or_default().locked -= fill.inner();
                funds.entry(order.pair.quote.clone()).or_default().free += quote_value;
            }
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeApi for PaperExchange {
    fn exchange_id(&self) -> &str {
        "paper"
    }

    fn features(&self) -> Features {
        *self.features.read()
    }

    async fn load_markets(&self) -> ExchangeResult<HashMap<Pair, MarketInfo>> {
        Ok(self.markets.read().clone())
    }

    async fn get_balances(&self, include_zero: bool) -> ExchangeResult<Vec<BalanceEntry>> {
        Ok(self
            .funds
            .read()
            .iter()
            .filter(|(_, f)| include_zero || !f.free.is_zero() || !f.locked.is_zero())
            .map(|(coin, f)| {
                BalanceEntry::new(coin.clone(), Amount::new(f.free), Amount::new(f.locked))
            })
            .collect())
    }

    async fn get_open_orders(&self, pair: &Pair) -> ExchangeResult<Vec<OpenOrder>> {
        Ok(self
            .orders
            .iter()
            .filter(|o| {
                o.pair == *pair
                    && !o.vanished
                    && matches!(o.status, PaperStatus::Open | PaperStatus::PartFilled)
            })
            .map(|o| OpenOrder {
                exchange_id: o.exchange_id.clone(),
                side: o.side,
                price: o.price,
                amount: o.amount,
                amount_executed: o.executed,
            })
            .collect())
    }

    async fn get_order_details(
        &self,
        exchange_id: &str,
        _pair: &Pair,
    ) -> ExchangeResult<OrderDetails> {
        if Self::take_failure(&self.detail_failures) {
            return Err(ExchangeError::Transient("injected detail failure".into()));
        }
        let order = match self.orders.get(exchange_id) {
            Some(o) if !o.vanished => o,
            _ => return Ok(OrderDetails::unknown()),
        };
        let status = match order.status {
            PaperStatus::Open => OrderDetailStatus::New,
            PaperStatus::PartFilled => OrderDetailStatus::PartFilled,
            PaperStatus::Filled => OrderDetailStatus::Filled,
            PaperStatus::Cancelled => OrderDetailStatus::Cancelled,
        };
        Ok(OrderDetails {
            status,
            base_filled: order.executed,
            quote_filled: Amount::new(order.executed.inner() * order.price.inner()),
        })
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> ExchangeResult<PlaceOutcome> {
        if Self::take_failure(&self.place_failures) {
            return Err(ExchangeError::Transient("injected place failure".into()));
        }
        if Self::take_failure(&self.place_rejections) {
            return Ok(PlaceOutcome::Rejected {
                reason: "injected rejection".into(),
            });
        }

        let price = match request.price {
            Some(p) => p,
            None => {
                // Market order: execute at the current last price
                let rates = self.rates.read();
                match rates.get(&request.pair) {
                    Some(r) => r.last,
                    None => {
                        return Ok(PlaceOutcome::Rejected {
                            reason: "no market price".into(),
                        })
                    }
                }
            }
        };
        let base = match (request.base_amount, request.quote_amount) {
            (Some(b), _) => b,
            (None, Some(q)) if !price.is_zero() => Amount::new(q.inner() / price.inner()),
            _ => {
                return Ok(PlaceOutcome::Rejected {
                    reason: "no amount".into(),
                })
            }
        };

        let mut funds = self.funds.write();
        if let Err(reason) = Self::lock_for(&mut funds, request.side, &request.pair, price, base) {
            return Ok(PlaceOutcome::Rejected { reason });
        }
        drop(funds);

        let exchange_id = format!("p{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut order = PaperOrder {
            exchange_id: exchange_id.clone(),
            pair: request.pair.clone(),
            side: request.side,
            price,
            amount: base,
            executed: Amount::ZERO,
            status: PaperStatus::Open,
            vanished: false,
        };
        if !request.is_limit {
            // Market orders settle immediately
            Self::settle(&mut self.funds.write(), &order, base);
            order.executed = base;
            order.status = PaperStatus::Filled;
        }
        self.orders.insert(exchange_id.clone(), order);
        Ok(PlaceOutcome::Placed { exchange_id })
    }

    async fn cancel_order(
        &self,
        exchange_id: &str,
        _side: OrderSide,
        _pair: &Pair,
    ) -> ExchangeResult<CancelOutcome> {
        if Self::take_failure(&self.cancel_failures) {
            return Err(ExchangeError::Transient("injected cancel failure".into()));
        }
        let mut order = match self.orders.get_mut(exchange_id) {
            Some(o) if !o.vanished => o,
            _ => return Ok(CancelOutcome::Unknown),
        };
        match order.status {
            PaperStatus::Filled | PaperStatus::Cancelled => Ok(CancelOutcome::AlreadyClosed),
            PaperStatus::Open | PaperStatus::PartFilled => {
                Self::unlock_remaining(&mut self.funds.write(), &order);
                order.status = PaperStatus::Cancelled;
                Ok(CancelOutcome::Cancelled)
            }
        }
    }

    async fn get_rates(&self, pair: &Pair) -> ExchangeResult<Rates> {
        if let Some(rates) = self.rates.read().get(pair) {
            return Ok(rates.clone());
        }
        // Derive from the book when no ticker was seeded
        let books = self.books.read();
        let book = books
            .get(pair)
            .ok_or_else(|| ExchangeError::Transient(format!("no rates for {pair}")))?;
        match (book.best_bid(), book.best_ask()) {
            (Some(bid), Some(ask)) => Ok(Rates {
                bid,
                ask,
                last: Price::mid(bid, ask),
                high_24h: ask,
                low_24h: bid,
                volume_24h: Amount::ZERO,
                quote_volume_24h: Amount::ZERO,
            }),
            _ => Err(ExchangeError::Transient(format!("empty book for {pair}"))),
        }
    }

    async fn get_order_book(&self, pair: &Pair) -> ExchangeResult<OrderBook> {
        Ok(self.books.read().get(pair).cloned().unwrap_or_default())
    }
}
