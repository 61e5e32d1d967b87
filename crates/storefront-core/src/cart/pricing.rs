//! Cart read model.

use crate::cart::{Cart, CouponCode, CouponRejection};
use crate::catalog::SellableUnit;
use crate::error::CommerceError;
use crate::ids::{CartId, LineId};
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Cart as returned to callers, with derived totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub lines: Vec<CartLineView>,
    pub item_count: i64,
    pub subtotal: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<CouponCode>,
    pub discount: Money,
    /// `max(0, subtotal - discount)`.
    pub total: Money,
    /// Whether the applied coupon waives shipping at checkout.
    pub free_shipping: bool,
    /// Set when the applied coupon no longer validates; it then gives no discount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_warning: Option<CouponRejection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineView {
    pub line_id: LineId,
    pub unit: SellableUnit,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Outcome of evaluating the cart's applied coupon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppliedCoupon {
    None,
    Valid { discount: Money, free_shipping: bool },
    Invalid(CouponRejection),
}

impl CartView {
    pub fn build(cart: &Cart, coupon: AppliedCoupon) -> Result<Self, CommerceError> {
        let lines = cart
            .lines
            .iter()
            .map(|l| {
                Ok(CartLineView {
                    line_id: l.id.clone(),
                    unit: l.unit.clone(),
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    line_total: l.line_total()?,
                })
            })
            .collect::<Result<Vec<_>, CommerceError>>()?;

        let subtotal = cart.subtotal()?;
        let (discount, free_shipping, coupon_warning) = match coupon {
            AppliedCoupon::None => (Money::zero(cart.currency), false, None),
            AppliedCoupon::Valid {
                discount,
                free_shipping,
            } => (discount, free_shipping, None),
            AppliedCoupon::Invalid(reason) => (Money::zero(cart.currency), false, Some(reason)),
        };
        let total = subtotal.try_subtract(&discount)?.floor_zero();

        Ok(Self {
            cart_id: cart.id.clone(),
            lines,
            item_count: cart.item_count(),
            subtotal,
            coupon_code: cart.coupon_code.clone(),
            discount,
            total,
            free_shipping,
            coupon_warning,
        })
    }

    pub fn has_discount(&self) -> bool {
        self.discount.amount_cents > 0
    }
}
