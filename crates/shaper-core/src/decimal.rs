//! Precision-safe decimal types for trading.
//!
//! Uses `rust_decimal` for exact decimal arithmetic, avoiding
//! floating-point rounding errors in price and amount calculations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

/// Price with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with amounts in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round down to the nearest tick multiple.
    #[inline]
    pub fn round_to_tick(&self, tick: Price) -> Self {
        if tick.is_zero() {
            return *self;
        }
        Self((self.0 / tick.0).floor() * tick.0)
    }

    /// Percentage difference from another price.
    #[inline]
    pub fn pct_from(&self, other: Price) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        Some((self.0 - other.0) / other.0 * Decimal::from(100))
    }

    /// Midpoint between two prices.
    #[inline]
    pub fn mid(a: Price, b: Price) -> Price {
        Price((a.0 + b.0) / Decimal::TWO)
    }

    /// Clamp into the inclusive band `[low, high]`.
    #[inline]
    pub fn clamp_to(&self, low: Price, high: Price) -> Price {
        if *self < low {
            low
        } else if *self > high {
            high
        } else {
            *self
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// Order amount (base or quote denominated) with exact decimal precision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round down to the given number of decimal places.
    #[inline]
    pub fn round_dp_down(&self, dp: u32) -> Self {
        Self(self.0.trunc_with_scale(dp))
    }

    #[inline]
    pub fn min(self, other: Amount) -> Amount {
        if self <= other {
            self
        } else {
            other
        }
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        let d = self.0 - rhs.0;
        if d.is_sign_negative() {
            Amount::ZERO
        } else {
            Amount(d)
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Amount {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Amount {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|a| a.0).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_to_tick() {
        let p = Price::new(dec!(100.137));
        assert_eq!(p.round_to_tick(Price::new(dec!(0.01))).inner(), dec!(100.13));
        assert_eq!(p.round_to_tick(Price::new(dec!(0.5))).inner(), dec!(100));
        // Zero tick leaves the price alone
        assert_eq!(p.round_to_tick(Price::ZERO), p);
    }

    #[test]
    fn test_pct_from() {
        let p = Price::new(dec!(105));
        assert_eq!(p.pct_from(Price::new(dec!(100))).unwrap(), dec!(5));
        assert!(p.pct_from(Price::ZERO).is_none());
    }

    #[test]
    fn test_clamp_to() {
        let low = Price::new(dec!(95));
        let high = Price::new(dec!(105));
        assert_eq!(Price::new(dec!(90)).clamp_to(low, high), low);
        assert_eq!(Price::new(dec!(110)).clamp_to(low, high), high);
        assert_eq!(Price::new(dec!(100)).clamp_to(low, high).inner(), dec!(100));
    }

    #[test]
    fn test_amount_saturating_sub() {
        let a = Amount::new(dec!(1.5));
        let b = Amount::new(dec!(2));
        assert_eq!(a.saturating_sub(b), Amount::ZERO);
        assert_eq!(b.saturating_sub(a).inner(), dec!(0.5));
    }

    #[test]
    fn test_amount_sum() {
        let total: Amount = [dec!(1), dec!(2.5), dec!(0.5)]
            .into_iter()
            .map(Amount::new)
            .sum();
        assert_eq!(total.inner(), dec!(4));
    }
}
