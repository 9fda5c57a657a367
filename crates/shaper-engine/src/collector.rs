//! Order collector: selective cancellation of ledger orders.
//!
//! Callers describe what to cancel with a [`CancelSelector`]; the
//! collector issues the exchange cancels, reconciles the tri-state
//! results into the ledger, and reports what happened.

use crate::error::EngineResult;
use crate::EngineContext;
use shaper_core::{CloseCause, Order, OrderSide, Pair, Price, Purpose};
use shaper_exchange::{CancelOutcome, ExchangeError};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which purposes a cancel run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPurpose {
    /// Every ledger purpose.
    All,
    /// Exchange-live orders whose id is not present in the ledger.
    Unknown,
    Purposes(Vec<Purpose>),
}

impl TargetPurpose {
    fn matches(&self, purpose: Purpose) -> bool {
        match self {
            Self::All => true,
            Self::Unknown => false,
            Self::Purposes(set) => set.contains(&purpose),
        }
    }
}

/// Price predicate on candidate orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceFilter {
    Above(Price),
    Below(Price),
    /// Outside the inclusive band; used for price-watcher defense.
    Outside { low: Price, high: Price },
}

impl PriceFilter {
    pub fn matches(&self, price: Price) -> bool {
        match self {
            Self::Above(p) => price > *p,
            Self::Below(p) => price < *p,
            Self::Outside { low, high } => price < *low || price > *high,
        }
    }
}

/// What to cancel.
#[derive(Debug, Clone)]
pub struct CancelSelector {
    pub target: TargetPurpose,
    pub pair: Pair,
    pub side: Option<OrderSide>,
    pub price_filter: Option<PriceFilter>,
    /// Only orders past their expiry deadline.
    pub expired_only: bool,
    /// Close rows locally even when the exchange outcome is uncertain.
    pub force: bool,
}

impl CancelSelector {
    pub fn purposes(pair: Pair, purposes: Vec<Purpose>) -> Self {
        Self {
            target: TargetPurpose::Purposes(purposes),
            pair,
            side: None,
            price_filter: None,
            expired_only: false,
            force: false,
        }
    }

    pub fn with_side(mut self, side: OrderSide) -> Self {
        self.side = Some(side);
        self
    }

    pub fn with_price_filter(mut self, filter: PriceFilter) -> Self {
        self.price_filter = Some(filter);
        self
    }

    pub fn expired(mut self) -> Self {
        self.expired_only = true;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    fn matches(&self, order: &Order, now: chrono::DateTime<chrono::Utc>) -> bool {
        if !self.target.matches(order.purpose) {
            return false;
        }
        if order.pair != self.pair {
            return false;
        }
        if let Some(side) = self.side {
            if order.side != side {
                return false;
            }
        }
        if let Some(filter) = self.price_filter {
            match order.price {
                Some(price) if filter.matches(price) => {}
                _ => return false,
            }
        }
        if self.expired_only && !order.is_expired(now) {
            return false;
        }
        true
    }
}

/// Outcome of one collect run.
#[derive(Debug, Default, Clone)]
pub struct CollectReport {
    pub attempted: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub already_closed: usize,
}

impl fmt::Display for CollectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted={}, cancelled={}, failed={}, already_closed={}",
            self.attempted, self.cancelled, self.failed, self.already_closed
        )
    }
}

pub struct OrderCollector {
    ctx: Arc<EngineContext>,
}

impl OrderCollector {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Cancel everything the selector matches, tagging closed rows with
    /// `cause`. `reason` names the caller in the log.
    pub async fn collect(
        &self,
        selector: &CancelSelector,
        cause: CloseCause,
        reason: &str,
    ) -> EngineResult<CollectReport> {
        let report = if selector.target == TargetPurpose::Unknown {
            self.collect_unknown(selector).await?
        } else {
            self.collect_ledger(selector, cause).await?
        };
        info!(%reason, %report, "Collect run finished");
        Ok(report)
    }

    /// Cancel ledger rows the selector matches.
    async fn collect_ledger(
        &self,
        selector: &CancelSelector,
        cause: CloseCause,
    ) -> EngineResult<CollectReport> {
        let now = chrono::Utc::now();
        let mut report = CollectReport::default();
        let candidates: Vec<Order> = self
            .ctx
            .ledger
            .open_orders(&selector.pair)
            .into_iter()
            .filter(|o| selector.matches(o, now))
            .collect();

        for order in candidates {
            report.attempted += 1;
            let exchange_id = match &order.exchange_id {
                Some(id) => id.clone(),
                None => {
                    // Never reached the exchange; close locally
                    self.ctx.ledger.update(&order.id, |o| o.close(cause))?;
                    report.already_closed += 1;
                    continue;
                }
            };

            match self
                .ctx
                .api
                .cancel_order(&exchange_id, order.side, &selector.pair)
                .await
            {
                Ok(CancelOutcome::Cancelled) => {
                    self.ctx.ledger.update(&order.id, |o| o.close(cause))?;
                    self.ctx.balances.invalidate();
                    report.cancelled += 1;
                }
                Ok(CancelOutcome::AlreadyClosed) => {
                    // Filled or cancelled on the exchange side; the row
                    // is closed without error, the reconciler refines
                    // the fills later.
                    self.ctx
                        .ledger
                        .update(&order.id, |o| o.close(CloseCause::ExternalCancel))?;
                    report.already_closed += 1;
                }
                Ok(CancelOutcome::Unknown) => {
                    if selector.force {
                        self.ctx.ledger.update(&order.id, |o| o.close(cause))?;
                        report.cancelled += 1;
                    } else {
                        debug!(id = %order.id, "Cancel returned unknown, left for reconciler");
                        report.failed += 1;
                    }
                }
                Err(ExchangeError::Transient(msg)) => {
                    if selector.force {
                        // Operator accepts the risk of local close
                        self.ctx.ledger.update(&order.id, |o| o.close(cause))?;
                        report.cancelled += 1;
                    } else {
                        debug!(id = %order.id, %msg, "Transient cancel failure, retried next tick");
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    warn!(id = %order.id, ?e, "Cancel failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Cancel exchange-live orders that no ledger row claims.
    async fn collect_unknown(&self, selector: &CancelSelector) -> EngineResult<CollectReport> {
        let mut report = CollectReport::default();
        let live = self.ctx.api.get_open_orders(&selector.pair).await?;

        for open in live {
            if self
                .ctx
                .ledger
                .find_by_exchange_id(&open.exchange_id)
                .is_some()
            {
                continue;
            }
            if let Some(side) = selector.side {
                if open.side != side {
                    continue;
                }
            }
            if let Some(filter) = selector.price_filter {
                if !filter.matches(open.price) {
                    continue;
                }
            }

            report.attempted += 1;
            match self
                .ctx
                .api
                .cancel_order(&open.exchange_id, open.side, &selector.pair)
                .await
            {
                Ok(CancelOutcome::Cancelled) => {
                    self.ctx.balances.invalidate();
                    report.cancelled += 1;
                }
                Ok(CancelOutcome::AlreadyClosed) => report.already_closed += 1,
                Ok(CancelOutcome::Unknown) => report.failed += 1,
                Err(e) => {
                    debug!(exchange_id = %open.exchange_id, ?e, "Unknown-order cancel failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_ctx, pair, place_tracked};
    use rust_decimal_macros::dec;
    use shaper_core::{Amount, TradeParams};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_price_filter_selects_subset() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, TradeParams::default());
        paper.set_balance("ADM", Amount::new(dec!(100)));

        // Four sell mm-orders at 0.3 / 0.4 / 0.6 / 0.7
        for price in [dec!(0.3), dec!(0.4), dec!(0.6), dec!(0.7)] {
            place_tracked(&ctx, &paper, Purpose::Mm, OrderSide::Sell, price, dec!(1)).await;
        }

        let selector = CancelSelector::purposes(pair(), vec![Purpose::Mm])
            .with_side(OrderSide::Sell)
            .with_price_filter(PriceFilter::Above(Price::new(dec!(0.5))));
        let collector = OrderCollector::new(ctx.clone());
        let report = collector
            .collect(&selector, CloseCause::UserCommand, "clear command")
            .await
            .unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.cancelled, 2);
        assert_eq!(ctx.ledger.find_open(Some(Purpose::Mm), &pair()).len(), 2);
    }

    #[tokio::test]
    async fn test_expired_only() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, TradeParams::default());
        paper.set_balance("ADM", Amount::new(dec!(100)));

        let (expired_id, _) =
            place_tracked(&ctx, &paper, Purpose::Ob, OrderSide::Sell, dec!(1), dec!(1)).await;
        ctx.ledger
            .update(&expired_id, |o| {
                o.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(5));
            })
            .unwrap();
        let (live_id, _) =
            place_tracked(&ctx, &paper, Purpose::Ob, OrderSide::Sell, dec!(1.1), dec!(1)).await;
        ctx.ledger
            .update(&live_id, |o| {
                o.expires_at = Some(chrono::Utc::now() + chrono::Duration::hours(1));
            })
            .unwrap();

        let selector = CancelSelector::purposes(pair(), vec![Purpose::Ob]).expired();
        let report = OrderCollector::new(ctx.clone())
            .collect(&selector, CloseCause::Expired, "expiry sweep")
            .await
            .unwrap();

        assert_eq!(report.cancelled, 1);
        assert!(ctx.ledger.find_by_id(&expired_id).unwrap().closed);
        assert!(ctx.ledger.find_by_id(&live_id).unwrap().is_open());
    }

    #[tokio::test]
    async fn test_already_closed_marks_row_without_error() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, TradeParams::default());
        paper.set_balance("ADM", Amount::new(dec!(100)));

        let (id, exchange_id) =
            place_tracked(&ctx, &paper, Purpose::Liq, OrderSide::Sell, dec!(1), dec!(2)).await;
        paper.simulate_fill(&exchange_id);

        let selector = CancelSelector::purposes(pair(), vec![Purpose::Liq]);
        let report = OrderCollector::new(ctx.clone())
            .collect(&selector, CloseCause::UserCommand, "clear liq")
            .await
            .unwrap();

        assert_eq!(report.already_closed, 1);
        assert_eq!(report.failed, 0);
        assert!(ctx.ledger.find_by_id(&id).unwrap().closed);
    }

    #[tokio::test]
    async fn test_transient_failure_without_force_retries_later() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, TradeParams::default());
        paper.set_balance("ADM", Amount::new(dec!(100)));

        let (id, _) =
            place_tracked(&ctx, &paper, Purpose::Ob, OrderSide::Sell, dec!(1), dec!(1)).await;
        paper.inject_cancel_failures(1);

        let selector = CancelSelector::purposes(pair(), vec![Purpose::Ob]);
        let collector = OrderCollector::new(ctx.clone());
        let report = collector
            .collect(&selector, CloseCause::UserCommand, "clear ob")
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert!(ctx.ledger.find_by_id(&id).unwrap().is_open());

        // Next run succeeds
        let report = collector
            .collect(&selector, CloseCause::UserCommand, "clear ob")
            .await
            .unwrap();
        assert_eq!(report.cancelled, 1);
    }

    #[tokio::test]
    async fn test_force_closes_on_uncertainty() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, TradeParams::default());
        paper.set_balance("ADM", Amount::new(dec!(100)));

        let (id, _) =
            place_tracked(&ctx, &paper, Purpose::Ob, OrderSide::Sell, dec!(1), dec!(1)).await;
        paper.inject_cancel_failures(1);

        let selector = CancelSelector::purposes(pair(), vec![Purpose::Ob]).forced();
        let report = OrderCollector::new(ctx.clone())
            .collect(&selector, CloseCause::UserCommand, "clear ob force")
            .await
            .unwrap();

        assert_eq!(report.cancelled, 1);
        assert!(ctx.ledger.find_by_id(&id).unwrap().closed);
    }

    #[tokio::test]
    async fn test_unknown_mode_cancels_foreign_orders_only() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, TradeParams::default());
        paper.set_balance("ADM", Amount::new(dec!(100)));

        // One tracked order, one foreign order
        let (tracked_id, tracked_exchange_id) =
            place_tracked(&ctx, &paper, Purpose::Ob, OrderSide::Sell, dec!(1), dec!(1)).await;
        let foreign = paper.inject_foreign_order(
            &pair(),
            OrderSide::Sell,
            Price::new(dec!(1.2)),
            Amount::new(dec!(3)),
        );

        let selector = CancelSelector {
            target: TargetPurpose::Unknown,
            pair: pair(),
            side: None,
            price_filter: None,
            expired_only: false,
            force: false,
        };
        let report = OrderCollector::new(ctx.clone())
            .collect(&selector, CloseCause::UserCommand, "clear unk")
            .await
            .unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.cancelled, 1);
        // The tracked order survived
        assert!(ctx.ledger.find_by_id(&tracked_id).unwrap().is_open());
        let live = paper.live_order_ids();
        assert!(live.contains(&tracked_exchange_id));
        assert!(!live.contains(&foreign));
    }
}
