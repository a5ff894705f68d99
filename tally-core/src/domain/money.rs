//! Fixed-point money
//!
//! Amounts and balances are held as integer minor units (cents). Decimal
//! strings are parsed and rendered through `rust_decimal` so no binary
//! floating point ever touches a balance.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::result::{Error, Result};

/// Number of fractional digits carried by every amount
pub const SCALE: u32 = 2;

const MINOR_PER_UNIT: i64 = 100;

/// A monetary value in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Convert a decimal into minor units.
    ///
    /// Values with more than two fractional digits are rejected rather than
    /// rounded, and values outside the `i64` minor-unit range are rejected.
    pub fn from_decimal(value: Decimal) -> Result<Self> {
        let normalized = value.normalize();
        if normalized.scale() > SCALE {
            return Err(Error::invalid_amount(format!(
                "{} has more than {} decimal places",
                value, SCALE
            )));
        }
        normalized
            .checked_mul(Decimal::from(MINOR_PER_UNIT))
            .and_then(|scaled| scaled.to_i64())
            .map(Self)
            .ok_or_else(|| Error::invalid_amount(format!("{} is out of range", value)))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, SCALE)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|_| Error::invalid_amount(format!("'{}' is not a decimal amount", trimmed)))?;
        Self::from_decimal(value)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::from_decimal(value)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
