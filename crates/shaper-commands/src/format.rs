//! Rendering of structured command results into operator text.
//!
//! Execution returns machine-readable structs; everything the operator
//! reads is produced here.

use shaper_core::{AccountSnapshot, MarketInfo, Order, Pair, Rates, TradeParams};
use shaper_engine::MakeReport;
use shaper_ledger::{PurposeStats, StatsWindow};
use std::fmt::Write;

pub fn format_rates(pair: &Pair, rates: &Rates) -> String {
    format!(
        "{pair}: last {}, bid {}, ask {}, 24h {}..{}, volume {} {} / {} {}",
        rates.last,
        rates.bid,
        rates.ask,
        rates.low_24h,
        rates.high_24h,
        rates.volume_24h,
        pair.base,
        rates.quote_volume_24h,
        pair.quote,
    )
}

pub fn format_balances(snapshot: &AccountSnapshot) -> String {
    if snapshot.entries.is_empty() {
        return "No balances".to_string();
    }
    let mut out = String::from("Balances:");
    for entry in &snapshot.entries {
        let _ = write!(
            out,
            "\n  {}: free {}, locked {}",
            entry.coin, entry.free, entry.locked
        );
    }
    if let Some(usd) = &snapshot.total_usd {
        let _ = write!(out, "\n  ≈ {usd} USD total");
    }
    if let Some(btc) = &snapshot.total_btc {
        let _ = write!(out, "\n  ≈ {btc} BTC total");
    }
    out
}

pub fn format_stats(
    pair: &Pair,
    window: StatsWindow,
    stats: &[(shaper_core::Purpose, PurposeStats)],
) -> String {
    let mut out = format!("Stats for {pair} ({window}):");
    for (purpose, s) in stats {
        if s.orders == 0 {
            continue;
        }
        let _ = write!(
            out,
            "\n  {purpose}: {} orders, {} filled, volume {} {} / {} {}",
            s.orders, s.filled, s.base_volume, pair.base, s.quote_volume, pair.quote,
        );
    }
    if !out.contains('\n') {
        out.push_str("\n  no orders in this window");
    }
    out
}

pub fn format_orders(pair: &Pair, orders: &[Order]) -> String {
    if orders.is_empty() {
        return format!("No open orders for {pair}");
    }
    let mut out = format!("{} open orders for {pair}:", orders.len());
    for order in orders {
        let price = order
            .price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "market".to_string());
        let _ = write!(
            out,
            "\n  [{}] {} {} {} @ {} (filled {})",
            order.purpose, order.side, order.base_remaining, pair.base, price, order.base_filled,
        );
    }
    out
}

pub fn format_params(params: &TradeParams) -> String {
    serde_json::to_string_pretty(params)
        .unwrap_or_else(|_| "Parameters unavailable".to_string())
}

pub fn format_market(pair: &Pair, market: &MarketInfo) -> String {
    format!(
        "{pair}: decimals {}/{}, min amount {}, max amount {}, tick {}",
        market.base_decimals,
        market.quote_decimals,
        market.min_amount,
        market
            .max_amount
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unlimited".to_string()),
        market.price_tick,
    )
}

pub fn format_make(report: &MakeReport) -> String {
    let after = report
        .rates_after
        .as_ref()
        .map(|r| format!("{} / {}", r.bid, r.ask))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Pm-order placed: {} {} @ {}. Spread before {} / {}, after {after}",
        report.side,
        report.amount,
        report.price,
        report.rates_before.bid,
        report.rates_before.ask,
    )
}
