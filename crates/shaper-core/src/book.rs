//! Order-book snapshot and derived prices.

use crate::decimal::{Amount, Price};
use crate::order::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price level: `(price, amount)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub amount: Amount,
}

impl BookLevel {
    pub fn new(price: Price, amount: Amount) -> Self {
        Self { price, amount }
    }
}

/// Order book snapshot: bids descending, asks ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn new(mut bids: Vec<BookLevel>, mut asks: Vec<BookLevel>) -> Self {
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        Self { bids, asks }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some(Price::mid(b, a)),
            _ => None,
        }
    }

    /// Levels on one side, best first.
    pub fn side(&self, side: OrderSide) -> &[BookLevel] {
        match side {
            OrderSide::Buy => &self.bids,
            OrderSide::Sell => &self.asks,
        }
    }

    /// Cumulative base amount on `side` up to and including `target`.
    ///
    /// This is the depth a taker must consume to move the price to the
    /// target level. Buy targets walk the asks, sell targets the bids.
    pub fn depth_to_price(&self, taker_side: OrderSide, target: Price) -> Amount {
        match taker_side {
            OrderSide::Buy => self
                .asks
                .iter()
                .take_while(|l| l.price <= target)
                .map(|l| l.amount)
                .sum(),
            OrderSide::Sell => self
                .bids
                .iter()
                .take_while(|l| l.price >= target)
                .map(|l| l.amount)
                .sum(),
        }
    }

    /// Dust-resistant best price on one side.
    ///
    /// Walks from the top and returns the first level carrying at least
    /// `min_share` of the side's total volume, so a one-satoshi spoof at
    /// the top does not define the range. Falls back to the plain best
    /// price when every level is small.
    pub fn smart_price(&self, side: OrderSide, min_share: Decimal) -> Option<Price> {
        let levels = self.side(side);
        let total: Decimal = levels.iter().map(|l| l.amount.inner()).sum();
        if total.is_zero() {
            return None;
        }
        levels
            .iter()
            .find(|l| l.amount.inner() / total >= min_share)
            .or_else(|| levels.first())
            .map(|l| l.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book() -> OrderBook {
        OrderBook::new(
            vec![
                BookLevel::new(Price::new(dec!(99)), Amount::new(dec!(5))),
                BookLevel::new(Price::new(dec!(98)), Amount::new(dec!(10))),
                BookLevel::new(Price::new(dec!(97)), Amount::new(dec!(20))),
            ],
            vec![
                BookLevel::new(Price::new(dec!(101)), Amount::new(dec!(5))),
                BookLevel::new(Price::new(dec!(102)), Amount::new(dec!(10))),
                BookLevel::new(Price::new(dec!(103)), Amount::new(dec!(20))),
            ],
        )
    }

    #[test]
    fn test_ordering_enforced() {
        // Deliberately unsorted input
        let book = OrderBook::new(
            vec![
                BookLevel::new(Price::new(dec!(97)), Amount::new(dec!(1))),
                BookLevel::new(Price::new(dec!(99)), Amount::new(dec!(1))),
            ],
            vec![
                BookLevel::new(Price::new(dec!(103)), Amount::new(dec!(1))),
                BookLevel::new(Price::new(dec!(101)), Amount::new(dec!(1))),
            ],
        );
        assert_eq!(book.best_bid().unwrap().inner(), dec!(99));
        assert_eq!(book.best_ask().unwrap().inner(), dec!(101));
    }

    #[test]
    fn test_mid() {
        assert_eq!(book().mid().unwrap().inner(), dec!(100));
        assert!(OrderBook::default().mid().is_none());
    }

    #[test]
    fn test_depth_to_price() {
        let b = book();
        // Buying up to 102 consumes the 101 and 102 ask levels
        assert_eq!(
            b.depth_to_price(OrderSide::Buy, Price::new(dec!(102))).inner(),
            dec!(15)
        );
        // Selling down to 98 consumes the 99 and 98 bid levels
        assert_eq!(
            b.depth_to_price(OrderSide::Sell, Price::new(dec!(98))).inner(),
            dec!(15)
        );
        // Target inside the spread touches nothing
        assert!(b.depth_to_price(OrderSide::Buy, Price::new(dec!(100))).is_zero());
    }

    #[test]
    fn test_smart_price_skips_dust() {
        let b = OrderBook::new(
            vec![
                BookLevel::new(Price::new(dec!(99.9)), Amount::new(dec!(0.001))),
                BookLevel::new(Price::new(dec!(99)), Amount::new(dec!(100))),
            ],
            vec![],
        );
        // The 0.001 spoof is below a 1% share; smart bid is 99
        assert_eq!(
            b.smart_price(OrderSide::Buy, dec!(0.01)).unwrap().inner(),
            dec!(99)
        );
        assert!(b.smart_price(OrderSide::Sell, dec!(0.01)).is_none());
    }
}
