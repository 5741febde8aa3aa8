//! Fixed-point token quantities.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits carried by ledger amounts.
pub const AMOUNT_DECIMALS: u32 = 18;

const UNIT: u128 = 10_u128.pow(AMOUNT_DECIMALS);

/// Token quantity stored as integer base units (18 decimals).
///
/// Amounts are parsed from and rendered as decimal strings such as `"100"`
/// or `"0.25"`, so they never pass through floating point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

/// Error returned when a decimal amount string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountParseError {
    /// The input was empty after trimming.
    #[error("amount must not be empty")]
    Empty,

    /// The input contained something other than digits and one point.
    #[error("invalid amount '{0}'")]
    Invalid(String),

    /// The input has more fractional digits than the ledger supports.
    #[error("amount '{0}' has more than 18 decimal places")]
    TooPrecise(String),

    /// The input does not fit in the base-unit representation.
    #[error("amount '{0}' is too large")]
    Overflow(String),
}

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from raw base units.
    #[must_use]
    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// Creates an amount from a whole number of tokens.
    ///
    /// Saturates at the largest representable amount.
    #[must_use]
    pub fn from_whole(tokens: u64) -> Self {
        Self(u128::from(tokens).saturating_mul(UNIT))
    }

    /// Returns the raw base units.
    #[must_use]
    pub const fn base_units(self) -> u128 {
        self.0
    }

    /// Returns `true` when the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Adds two amounts, clamping at the maximum.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts `other`, clamping at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let all_digits = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction)
        {
            return Err(AmountParseError::Invalid(value.to_owned()));
        }
        if fraction.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(value.to_owned()));
        }

        let overflow = || AmountParseError::Overflow(value.to_owned());
        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| overflow())?
        };
        let padded = format!("{fraction:0<width$}", width = AMOUNT_DECIMALS as usize);
        let fraction_units = padded.parse::<u128>().map_err(|_| overflow())?;

        whole_units
            .checked_mul(UNIT)
            .and_then(|units| units.checked_add(fraction_units))
            .map(Self)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0.div_euclid(UNIT);
        let fraction = self.0.rem_euclid(UNIT);
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{fraction:0>width$}", width = AMOUNT_DECIMALS as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}
