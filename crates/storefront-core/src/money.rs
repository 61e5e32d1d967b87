//! Money type for representing monetary values.
//!
//! Amounts are integer minor units (cents). Every fractional result is
//! rounded half-up exactly once, at the point it is computed.

use crate::error::CommerceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis points in one whole (100%).
pub const BASIS_POINTS: i64 = 10_000;

/// Supported currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Currency {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    TRY,
}

impl Currency {
    /// Get the currency code (e.g., "USD").
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::TRY => "TRY",
        }
    }

    /// Get the currency symbol (e.g., "$").
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "\u{20ac}",
            Currency::GBP => "\u{00a3}",
            Currency::CAD => "CA$",
            Currency::AUD => "A$",
            Currency::TRY => "\u{20ba}",
        }
    }

    /// Parse a currency code string.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "CAD" => Some(Currency::CAD),
            "AUD" => Some(Currency::AUD),
            "TRY" => Some(Currency::TRY),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A monetary value with currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Money {
    /// Amount in cents.
    pub amount_cents: i64,
    /// The currency.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money value from cents.
    pub fn new(amount_cents: i64, currency: Currency) -> Self {
        Self {
            amount_cents,
            currency,
        }
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount_cents == 0
    }

    pub fn is_negative(&self) -> bool {
        self.amount_cents < 0
    }

    /// Format as "49.99".
    pub fn display_amount(&self) -> String {
        let sign = if self.amount_cents < 0 { "-" } else { "" };
        let abs = self.amount_cents.unsigned_abs();
        format!("{}{}.{:02}", sign, abs / 100, abs % 100)
    }

    /// Format as "$49.99".
    pub fn display(&self) -> String {
        format!("{}{}", self.currency.symbol(), self.display_amount())
    }

    fn same_currency(&self, other: &Money) -> Result<(), CommerceError> {
        if self.currency != other.currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                got: other.currency.code().to_string(),
            });
        }
        Ok(())
    }

    /// Add another Money value.
    pub fn try_add(&self, other: &Money) -> Result<Money, CommerceError> {
        self.same_currency(other)?;
        let amount = self
            .amount_cents
            .checked_add(other.amount_cents)
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Subtract another Money value.
    pub fn try_subtract(&self, other: &Money) -> Result<Money, CommerceError> {
        self.same_currency(other)?;
        let amount = self
            .amount_cents
            .checked_sub(other.amount_cents)
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Multiply by a quantity.
    pub fn try_multiply(&self, factor: i64) -> Result<Money, CommerceError> {
        let amount = self
            .amount_cents
            .checked_mul(factor)
            .ok_or(CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Take `basis_points / 10_000` of this amount, rounded half-up to the cent.
    pub fn percentage_bps(&self, basis_points: i64) -> Result<Money, CommerceError> {
        let scaled = i128::from(self.amount_cents) * i128::from(basis_points);
        let half = i128::from(BASIS_POINTS / 2);
        let rounded = if scaled >= 0 {
            (scaled + half) / i128::from(BASIS_POINTS)
        } else {
            (scaled - half) / i128::from(BASIS_POINTS)
        };
        let amount = i64::try_from(rounded).map_err(|_| CommerceError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// The smaller of two amounts in the same currency.
    pub fn min(self, other: Money) -> Result<Money, CommerceError> {
        self.same_currency(&other)?;
        Ok(if other.amount_cents < self.amount_cents {
            other
        } else {
            self
        })
    }

    /// Clamp negative amounts to zero.
    pub fn floor_zero(self) -> Money {
        Money::new(self.amount_cents.max(0), self.currency)
    }

    /// Sum an iterator of Money values.
    pub fn try_sum<'a>(
        mut iter: impl Iterator<Item = &'a Money>,
        currency: Currency,
    ) -> Result<Money, CommerceError> {
        iter.try_fold(Money::zero(currency), |acc, m| acc.try_add(m))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}
