//! Coupon definitions, validation rules and discount computation.

use crate::error::CommerceError;
use crate::ids::{OrderId, UserId};
use crate::money::{Money, BASIS_POINTS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Case-insensitive coupon code, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for CouponCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for CouponCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self {
        code.0
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a coupon takes off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponKind {
    /// Share of the item subtotal, in basis points (1000 = 10%).
    Percentage { basis_points: i64 },
    /// Fixed amount off the item subtotal.
    Fixed { amount: Money },
    /// Waives shipping on eligible methods; no item discount.
    FreeShipping,
}

/// Why a coupon was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponRejection {
    #[error("coupon not found")]
    NotFound,
    #[error("coupon is inactive")]
    Inactive,
    #[error("coupon is not active yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("order is below the coupon minimum")]
    BelowMinimum,
    #[error("coupon usage limit reached")]
    UsageExhausted,
    #[error("coupon already used the maximum number of times by this customer")]
    CustomerLimitReached,
}

/// A coupon as stored in the coupon catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: CouponCode,
    #[serde(flatten)]
    pub kind: CouponKind,
    /// Cap on a percentage discount.
    #[serde(default)]
    pub max_discount: Option<Money>,
    /// Subtotal required before the coupon applies.
    #[serde(default)]
    pub min_order_amount: Option<Money>,
    /// Total redemptions allowed (None = unlimited).
    #[serde(default)]
    pub usage_limit: Option<i64>,
    #[serde(default)]
    pub used_count: i64,
    /// Redemptions allowed per authenticated customer.
    #[serde(default)]
    pub per_customer_limit: Option<i64>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Coupon {
    fn with_kind(code: impl AsRef<str>, kind: CouponKind) -> Self {
        Self {
            code: CouponCode::new(code),
            kind,
            max_discount: None,
            min_order_amount: None,
            usage_limit: None,
            used_count: 0,
            per_customer_limit: None,
            starts_at: None,
            ends_at: None,
            active: true,
        }
    }

    /// Whole-percent discount (10 = 10% off).
    pub fn percentage(code: impl AsRef<str>, percent: i64) -> Self {
        Self::with_kind(
            code,
            CouponKind::Percentage {
                basis_points: percent * (BASIS_POINTS / 100),
            },
        )
    }

    pub fn fixed(code: impl AsRef<str>, amount: Money) -> Self {
        Self::with_kind(code, CouponKind::Fixed { amount })
    }

    pub fn free_shipping(code: impl AsRef<str>) -> Self {
        Self::with_kind(code, CouponKind::FreeShipping)
    }

    /// Check the coupon's own rules against a subtotal at a point in time.
    ///
    /// Order: active, window, minimum, usage. The first failure wins.
    /// Per-customer limits need redemption history and are checked by the engine.
    pub fn check(&self, subtotal: &Money, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }
        if self.starts_at.is_some_and(|starts| now < starts) {
            return Err(CouponRejection::NotStarted);
        }
        if self.ends_at.is_some_and(|ends| now > ends) {
            return Err(CouponRejection::Expired);
        }
        if let Some(min) = &self.min_order_amount {
            if subtotal.amount_cents < min.amount_cents {
                return Err(CouponRejection::BelowMinimum);
            }
        }
        if !self.has_uses_left() {
            return Err(CouponRejection::UsageExhausted);
        }
        Ok(())
    }

    pub fn has_uses_left(&self) -> bool {
        self.usage_limit.map_or(true, |limit| self.used_count < limit)
    }

    /// Item discount for a subtotal. Never negative and never above the subtotal.
    pub fn compute_discount(&self, subtotal: &Money) -> Result<Money, CommerceError> {
        let discount = match &self.kind {
            CouponKind::Percentage { basis_points } => {
                let raw = subtotal.percentage_bps(*basis_points)?;
                match &self.max_discount {
                    Some(cap) => raw.min(*cap)?,
                    None => raw,
                }
            }
            CouponKind::Fixed { amount } => {
                if amount.currency != subtotal.currency {
                    return Err(CommerceError::CurrencyMismatch {
                        expected: subtotal.currency.code().to_string(),
                        got: amount.currency.code().to_string(),
                    });
                }
                *amount
            }
            CouponKind::FreeShipping => Money::zero(subtotal.currency),
        };
        discount.floor_zero().min(subtotal.floor_zero())
    }

    pub fn waives_shipping(&self) -> bool {
        matches!(self.kind, CouponKind::FreeShipping)
    }
}

/// One use of a coupon by a customer, recorded with the order that used it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRedemption {
    pub code: CouponCode,
    pub user_id: UserId,
    pub order_id: OrderId,
    pub redeemed_at: DateTime<Utc>,
}
