//! Order reconciler: refreshes ledger rows against the exchange.
//!
//! Runs before every maker iteration that asks "how many open orders of
//! purpose X are there", so placement decisions always see a ledger
//! view from the same tick.

use crate::EngineContext;
use shaper_core::{CloseCause, Order, Purpose};
use shaper_exchange::{ExchangeError, OrderDetailStatus};
use std::sync::Arc;
use tracing::{debug, warn};

/// Consecutive "unknown" observations before a row is treated as
/// externally cancelled.
const MISSING_STRIKE_LIMIT: u8 = 2;

/// What one reconciliation pass observed.
#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    pub checked: usize,
    pub filled: usize,
    pub part_filled: usize,
    pub closed_external: usize,
    pub missing_once: usize,
    pub transient_errors: usize,
}

pub struct Reconciler {
    ctx: Arc<EngineContext>,
}

impl Reconciler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Refresh every open ledger order of `purpose` (all purposes when
    /// `None`) against the exchange.
    pub async fn reconcile(&self, purpose: Option<Purpose>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let open = self.ctx.ledger.find_open(purpose, &self.ctx.pair);

        for order in open {
            let exchange_id = match &order.exchange_id {
                Some(id) => id.clone(),
                // Never accepted by the exchange; nothing to ask about
                None => continue,
            };
            report.checked += 1;

            let details = match self
                .ctx
                .api
                .get_order_details(&exchange_id, &self.ctx.pair)
                .await
            {
                Ok(details) => details,
                Err(ExchangeError::Transient(msg)) => {
                    debug!(id = %order.id, %msg, "Transient error, retried next tick");
                    report.transient_errors += 1;
                    continue;
                }
                Err(e) => {
                    warn!(id = %order.id, ?e, "Reconcile failed");
                    continue;
                }
            };

            let update = match details.status {
                OrderDetailStatus::Filled => {
                    report.filled += 1;
                    self.ctx.ledger.update(&order.id, |o| {
                        o.apply_fill(details.base_filled, details.quote_filled);
                        o.close(CloseCause::Filled);
                    })
                }
                OrderDetailStatus::Cancelled => {
                    report.closed_external += 1;
                    self.ctx.ledger.update(&order.id, |o| {
                        o.apply_fill(details.base_filled, details.quote_filled);
                        o.close(CloseCause::ExternalCancel);
                    })
                }
                OrderDetailStatus::PartFilled => {
                    report.part_filled += 1;
                    self.ctx.ledger.update(&order.id, |o| {
                        o.apply_fill(details.base_filled, details.quote_filled);
                        o.missing_strikes = 0;
                    })
                }
                OrderDetailStatus::New => self.ctx.ledger.update(&order.id, |o| {
                    o.missing_strikes = 0;
                }),
                OrderDetailStatus::Unknown => self.strike(&order, &mut report),
            };

            if let Err(e) = update {
                warn!(id = %order.id, ?e, "Ledger update failed during reconcile");
            }
        }

        debug!(
            checked = report.checked,
            filled = report.filled,
            closed_external = report.closed_external,
            "Reconcile pass done"
        );
        report
    }

    /// Exponential escape for unrecognized ids: tolerated once, closed
    /// as externally cancelled on the second consecutive observation.
    fn strike(
        &self,
        order: &Order,
        report: &mut ReconcileReport,
    ) -> shaper_ledger::LedgerResult<Order> {
        let strikes = order.missing_strikes + 1;
        if strikes >= MISSING_STRIKE_LIMIT {
            report.closed_external += 1;
            self.ctx.ledger.update(&order.id, |o| {
                o.missing_strikes = strikes;
                o.close(CloseCause::ExternalCancel);
            })
        } else {
            report.missing_once += 1;
            self.ctx.ledger.update(&order.id, |o| {
                o.missing_strikes = strikes;
            })
        }
    }
}
