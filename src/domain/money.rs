use crate::error::RentalError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Mul;

/// Number of decimal places of the currency's minimal unit.
pub const MINOR_UNIT_DP: u32 = 2;

/// A non-negative monetary amount.
///
/// Wraps `rust_decimal::Decimal` so that cost arithmetic never goes through
/// floating point. Values are rounded to the minimal currency unit whenever
/// they enter the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const MAX: Self = Self(Decimal::MAX);

    pub fn new(value: Decimal) -> Result<Self, RentalError> {
        if value >= Decimal::ZERO {
            Ok(Self(value.round_dp(MINOR_UNIT_DP)))
        } else {
            Err(RentalError::ConfigError(format!(
                "monetary amount must not be negative, got {value}"
            )))
        }
    }

    /// Builds an amount from a count of minimal currency units.
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), MINOR_UNIT_DP))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Money {
    type Error = RentalError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

/// Rate times a number of minutes, saturating at `Money::MAX`.
impl Mul<u32> for Money {
    type Output = Self;
    fn mul(self, rhs: u32) -> Self::Output {
        self.0
            .checked_mul(Decimal::from(rhs))
            .map_or(Self::MAX, Self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
