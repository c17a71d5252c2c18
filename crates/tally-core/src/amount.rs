//! Exact money amounts.
//!
//! [`Amount`] stores a non-negative quantity in minor units (cents) as an
//! `i64`. Floating point never touches a cap or a claim; admission
//! arithmetic is integer `min` and saturating add/subtract only.
//!
//! The text form is a decimal with up to two fractional digits
//! (`"5000"`, `"1234.5"`, `"1234.56"`).

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

const MINOR_PER_MAJOR: i64 = 100;

/// Non-negative amount in minor currency units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Build from minor units, rejecting negatives.
    pub fn from_minor(minor: i64) -> Result<Self, ValidationError> {
        if minor < 0 {
            return Err(ValidationError::InvalidAmount {
                input: minor.to_string(),
                reason: "amounts cannot be negative",
            });
        }
        Ok(Self(minor))
    }

    /// Build from whole major units (e.g. `Amount::major(5000)` is 5000.00).
    ///
    /// # Panics
    ///
    /// Panics on negative input or overflow. Intended for literals.
    #[must_use]
    pub const fn major(units: i64) -> Self {
        assert!(units >= 0, "amounts cannot be negative");
        Self(units * MINOR_PER_MAJOR)
    }

    /// Value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Whether this amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `max(0, self - rhs)`.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        let diff = self.0.saturating_sub(rhs.0);
        Self(if diff < 0 { 0 } else { diff })
    }

    /// `self + rhs`, saturating at `i64::MAX` minor units.
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// `self + rhs`, or `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / MINOR_PER_MAJOR,
            self.0 % MINOR_PER_MAJOR
        )
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = |reason: &'static str| ValidationError::InvalidAmount {
            input: s.to_owned(),
            reason,
        };

        if input.is_empty() {
            return Err(ValidationError::Missing { field: "amount" });
        }
        if input.starts_with('-') {
            return Err(invalid("amounts cannot be negative"));
        }

        let (whole, frac) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected a decimal number"));
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected a decimal number"));
        }
        if frac.len() > 2 {
            return Err(invalid("at most two fractional digits are allowed"));
        }

        let whole: i64 = whole.parse().map_err(|_| invalid("amount is too large"))?;
        let frac_minor: i64 = match frac.len() {
            0 => 0,
            1 => i64::from(frac.as_bytes()[0] - b'0') * 10,
            _ => frac.parse().map_err(|_| invalid("expected a decimal number"))?,
        };

        whole
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(frac_minor))
            .map(Self)
            .ok_or_else(|| invalid("amount is too large"))
    }
}

impl ToSql for Amount {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Amount {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let minor = value.as_i64()?;
        if minor < 0 {
            return Err(FromSqlError::OutOfRange(minor));
        }
        Ok(Self(minor))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
