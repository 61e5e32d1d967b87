//! Cart aggregate and its lines.

use crate::cart::CouponCode;
use crate::catalog::{CatalogEntry, SellableUnit};
use crate::error::CommerceError;
use crate::identity::CartOwner;
use crate::ids::{CartId, LineId};
use crate::money::{Currency, Money};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Maximum quantity allowed per cart line.
pub const MAX_QUANTITY_PER_LINE: i64 = 999;

/// Reject quantities the cart would never accept.
pub fn validate_quantity(quantity: i64) -> Result<(), CommerceError> {
    if quantity <= 0 {
        return Err(CommerceError::InvalidQuantity(quantity));
    }
    if quantity > MAX_QUANTITY_PER_LINE {
        return Err(CommerceError::QuantityExceedsLimit(
            quantity,
            MAX_QUANTITY_PER_LINE,
        ));
    }
    Ok(())
}

/// A shopping cart owned by exactly one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    /// Lines, at most one per sellable unit.
    pub lines: Vec<CartLine>,
    /// Applied coupon, validated again whenever totals are computed.
    pub coupon_code: Option<CouponCode>,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    /// Drives anonymous-cart expiry.
    pub last_activity_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: CartOwner, currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::generate(),
            owner,
            lines: Vec::new(),
            coupon_code: None,
            currency,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Add `quantity` of a catalog entry.
    ///
    /// An existing line for the same unit has its quantity increased and its
    /// price refreshed to the current catalog price.
    pub fn add_line(
        &mut self,
        entry: &CatalogEntry,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<LineId, CommerceError> {
        validate_quantity(quantity)?;

        if entry.unit_price.currency != self.currency {
            return Err(CommerceError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                got: entry.unit_price.currency.code().to_string(),
            });
        }

        if let Some(existing) = self.lines.iter_mut().find(|l| l.unit == entry.unit) {
            let new_quantity = existing
                .quantity
                .checked_add(quantity)
                .ok_or(CommerceError::Overflow)?;
            validate_quantity(new_quantity)?;

            existing.quantity = new_quantity;
            existing.unit_price = entry.unit_price;
            existing.name = entry.name.clone();
            self.last_activity_at = now;
            return Ok(existing.id.clone());
        }

        let line = CartLine::new(
            entry.unit.clone(),
            entry.name.clone(),
            quantity,
            entry.unit_price,
        );
        let id = line.id.clone();
        self.lines.push(line);
        self.last_activity_at = now;
        Ok(id)
    }

    /// Set a line's quantity directly.
    pub fn update_quantity(
        &mut self,
        line_id: &LineId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<(), CommerceError> {
        validate_quantity(quantity)?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| &l.id == line_id)
            .ok_or_else(|| CommerceError::LineNotFound(line_id.to_string()))?;
        line.quantity = quantity;
        self.last_activity_at = now;
        Ok(())
    }

    pub fn remove_line(
        &mut self,
        line_id: &LineId,
        now: DateTime<Utc>,
    ) -> Result<(), CommerceError> {
        let len_before = self.lines.len();
        self.lines.retain(|l| &l.id != line_id);
        if self.lines.len() == len_before {
            return Err(CommerceError::LineNotFound(line_id.to_string()));
        }
        self.last_activity_at = now;
        Ok(())
    }

    /// Drop every line and the coupon association.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.lines.clear();
        self.coupon_code = None;
        self.last_activity_at = now;
    }

    /// Fold another cart's lines into this one.
    ///
    /// Matching units sum their quantities, capped at the per-line maximum with
    /// the excess dropped. New units keep the price they were captured at.
    /// Returns the number of incoming lines folded in.
    pub fn absorb(&mut self, incoming: &[CartLine], now: DateTime<Utc>) -> usize {
        let mut merged = 0;
        for line in incoming {
            if line.quantity <= 0 {
                continue;
            }
            match self.lines.iter_mut().find(|l| l.unit == line.unit) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .saturating_add(line.quantity)
                        .min(MAX_QUANTITY_PER_LINE);
                }
                None => {
                    self.lines.push(CartLine::new(
                        line.unit.clone(),
                        line.name.clone(),
                        line.quantity.min(MAX_QUANTITY_PER_LINE),
                        line.unit_price,
                    ));
                }
            }
            merged += 1;
        }
        if merged > 0 {
            self.last_activity_at = now;
        }
        merged
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Sum of line totals.
    pub fn subtotal(&self) -> Result<Money, CommerceError> {
        self.lines
            .iter()
            .try_fold(Money::zero(self.currency), |acc, line| {
                acc.try_add(&line.line_total()?)
            })
    }

    /// Total item count (sum of quantities).
    pub fn item_count(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, line_id: &LineId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.id == line_id)
    }

    pub fn line_for(&self, unit: &SellableUnit) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.unit == unit)
    }

    /// Whether an anonymous cart has outlived its retention window.
    pub fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        self.owner.is_anonymous() && now - self.last_activity_at > retention
    }

    /// Whether two snapshots hold the same units, quantities and prices.
    pub fn same_contents(&self, other: &Cart) -> bool {
        let key = |c: &Cart| {
            let mut lines: Vec<_> = c
                .lines
                .iter()
                .map(|l| (l.unit.clone(), l.quantity, l.unit_price))
                .collect();
            lines.sort_by(|a, b| a.0.cmp(&b.0));
            lines
        };
        key(self) == key(other)
    }
}

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: LineId,
    pub unit: SellableUnit,
    /// Product name at add-time.
    pub name: String,
    pub quantity: i64,
    /// Price captured when the line was added or last refreshed.
    pub unit_price: Money,
}

impl CartLine {
    pub fn new(
        unit: SellableUnit,
        name: impl Into<String>,
        quantity: i64,
        unit_price: Money,
    ) -> Self {
        Self {
            id: LineId::generate(),
            unit,
            name: name.into(),
            quantity,
            unit_price,
        }
    }

    /// `unit_price * quantity`, always recomputed.
    pub fn line_total(&self) -> Result<Money, CommerceError> {
        self.unit_price.try_multiply(self.quantity)
    }
}
