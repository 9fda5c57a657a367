//! Ticker rates for a pair.

use crate::decimal::{Amount, Price};
use serde::{Deserialize, Serialize};

/// Exchange ticker snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rates {
    pub bid: Price,
    pub ask: Price,
    pub last: Price,
    pub high_24h: Price,
    pub low_24h: Price,
    pub volume_24h: Amount,
    pub quote_volume_24h: Amount,
}

impl Rates {
    /// Midpoint of bid and ask.
    pub fn mid(&self) -> Price {
        Price::mid(self.bid, self.ask)
    }

    /// Spread as a percentage of the mid, `None` on a degenerate book.
    pub fn spread_percent(&self) -> Option<rust_decimal::Decimal> {
        let mid = self.mid();
        if mid.is_zero() {
            return None;
        }
        Some((self.ask.inner() - self.bid.inner()) / mid.inner() * rust_decimal::Decimal::from(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mid_and_spread() {
        let rates = Rates {
            bid: Price::new(dec!(99)),
            ask: Price::new(dec!(101)),
            last: Price::new(dec!(100)),
            high_24h: Price::new(dec!(110)),
            low_24h: Price::new(dec!(90)),
            volume_24h: Amount::new(dec!(1000)),
            quote_volume_24h: Amount::new(dec!(100000)),
        };
        assert_eq!(rates.mid().inner(), dec!(100));
        assert_eq!(rates.spread_percent().unwrap(), dec!(2));
    }
}
