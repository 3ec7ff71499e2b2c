//! Money type
//!
//! Fixed-point decimal for all monetary values. Floating point is banned
//! for money everywhere in this crate; amounts are validated at
//! construction so malformed values cannot exist in the system.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

/// Maximum absolute monetary value (1 trillion)
const MAX_MAGNITUDE: &str = "1000000000000";

/// Maximum decimal places (currency cents)
const MAX_SCALE: u32 = 2;

/// Money represents a validated fixed-point monetary value.
///
/// Values are signed: wallet balances may go negative down to the
/// wallet's credit limit. Prices and ledger amounts additionally
/// require positivity, enforced at their use sites.
///
/// # Invariants
/// - At most 2 decimal places
/// - Absolute value at most 1 trillion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(Decimal);

/// Errors that can occur when creating or combining Money values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed magnitude ({MAX_MAGNITUDE})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Money {
    /// Create a new Money value with validation.
    ///
    /// # Errors
    /// - `MoneyError::TooManyDecimals` if more than 2 decimal places
    /// - `MoneyError::Overflow` if the magnitude exceeds 1 trillion
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value.scale() > MAX_SCALE {
            return Err(MoneyError::TooManyDecimals(value.scale()));
        }

        let max = Decimal::from_str(MAX_MAGNITUDE).expect("Invalid MAX_MAGNITUDE constant");
        if value.abs() > max {
            return Err(MoneyError::Overflow);
        }

        Ok(Self(value))
    }

    /// Zero value
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Create Money from an integer number of currency units.
    pub fn from_integer(value: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::from(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Checked addition, revalidating magnitude bounds.
    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        Money::new(self.0 + other.0)
    }

    /// Checked subtraction, revalidating magnitude bounds.
    pub fn checked_sub(&self, other: Money) -> Result<Money, MoneyError> {
        Money::new(self.0 - other.0)
    }

    /// Multiply a unit price by an ordered quantity. Scale cannot grow
    /// past 2 because the multiplier is an integer.
    pub fn times(&self, quantity: u32) -> Result<Money, MoneyError> {
        Money::new(self.0 * Decimal::from(quantity))
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s).map_err(|e| MoneyError::ParseError(e.to_string()))?;
        Money::new(decimal)
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Money::from_str(&value)
    }
}

impl From<Money> for String {
    fn from(money: Money) -> Self {
        format!("{:.2}", money.0)
    }
}
