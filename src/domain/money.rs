//! Exact currency arithmetic.
//!
//! All vault balances, bid amounts and settlement amounts flow through
//! `Money`, a `Decimal` newtype held at two decimal places. Rounding
//! happens exactly once, at construction; every later operation is exact,
//! so a total computed for display is the same value that gets persisted.

use std::fmt;
use std::ops::Neg;

use rust_decimal::prelude::{FromStr, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

/// Number of minor units (cents) per major unit.
const MINOR_SCALE: u32 = 2;

/// A currency amount normalised to minor-unit precision.
///
/// Serializes as a decimal string (`"1000.00"`) and accepts either a
/// string or a JSON number on input, so remote payloads that send plain
/// numbers still round-trip without float drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount, rounding to minor units (midpoint away from zero).
    pub fn new(value: Decimal) -> Self {
        let mut rounded =
            value.round_dp_with_strategy(MINOR_SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(MINOR_SCALE);
        Self(rounded)
    }

    /// Create an amount from whole major units.
    pub fn from_major(units: i64) -> Self {
        Self::new(Decimal::from(units))
    }

    /// Create an amount from minor units (e.g. cents).
    pub fn from_minor_units(minor: i64) -> Self {
        Self(Decimal::new(minor, MINOR_SCALE))
    }

    /// Exact minor-unit representation, as sent to payment gateways.
    ///
    /// Returns `None` only if the amount does not fit in an `i64`.
    pub fn to_minor_units(self) -> Option<i64> {
        self.0.checked_mul(Decimal::from(100))?.trunc().to_i64()
    }

    /// Underlying decimal value.
    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    /// Whether the amount is strictly positive.
    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Whether the amount is strictly negative.
    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Multiply by a whole quantity.
    ///
    /// `None` when the product overflows or would lose minor-unit scale;
    /// an exact product of two-place and integral factors keeps two places.
    pub fn times(self, quantity: u32) -> Option<Self> {
        Self::exact(self.0.checked_mul(Decimal::from(quantity))?)
    }

    /// Sum, or `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Self::exact(self.0.checked_add(rhs.0)?)
    }

    /// Difference, or `None` on overflow.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        Self::exact(self.0.checked_sub(rhs.0)?)
    }

    /// Apply a percentage (e.g. a gateway fee), rounded to minor units.
    /// `None` on overflow.
    pub fn percent(self, pct: Decimal) -> Option<Self> {
        let scaled = self.0.checked_mul(pct)?.checked_div(Decimal::from(100))?;
        Some(Self::new(scaled))
    }

    fn exact(value: Decimal) -> Option<Self> {
        (value.scale() == MINOR_SCALE).then_some(Self(value))
    }

    /// Parse a user-entered amount such as `"100"` or `"99.995"`.
    pub fn parse(input: &str) -> Option<Self> {
        Decimal::from_str(input.trim()).ok().map(Self::new)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer).map(Self::new)
    }
}

/// Projected daily cost of a bid: `bid_amount × leads_per_day`.
///
/// Computed once per workflow run; the result is persisted verbatim.
/// `None` when the total cannot be held exactly.
pub fn total_cost(bid_amount: Money, leads_per_day: u32) -> Option<Money> {
    bid_amount.times(leads_per_day)
}
