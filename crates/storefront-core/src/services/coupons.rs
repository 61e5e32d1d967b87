//! Coupon engine.

use crate::cart::{AppliedCoupon, Cart, Coupon, CouponCode, CouponRejection};
use crate::clock::Clock;
use crate::error::CommerceError;
use crate::identity::Identity;
use crate::money::Money;
use crate::store::{Store, Transaction};
use std::sync::Arc;

#[derive(Clone)]
pub struct CouponEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl CouponEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate `code` for a subtotal and identity in a transaction of its own.
    pub async fn validate(
        &self,
        code: &CouponCode,
        subtotal: &Money,
        identity: &Identity,
    ) -> Result<Coupon, CommerceError> {
        let mut tx = self.store.begin().await?;
        self.validate_in(tx.as_mut(), code, subtotal, identity).await
    }

    /// Check, in order: exists, active, window, minimum, usage, per-customer use.
    ///
    /// Returns the coupon snapshot that passed. Rejections are
    /// `CommerceError::InvalidCoupon`.
    pub async fn validate_in(
        &self,
        tx: &mut dyn Transaction,
        code: &CouponCode,
        subtotal: &Money,
        identity: &Identity,
    ) -> Result<Coupon, CommerceError> {
        let coupon = tx
            .coupon(code)
            .await?
            .ok_or(CommerceError::InvalidCoupon(CouponRejection::NotFound))?;

        coupon
            .check(subtotal, self.clock.now())
            .map_err(CommerceError::InvalidCoupon)?;

        if let (Some(limit), Some(user_id)) = (coupon.per_customer_limit, identity.user_id()) {
            if tx.redemption_count(code, user_id).await? >= limit {
                return Err(CommerceError::InvalidCoupon(
                    CouponRejection::CustomerLimitReached,
                ));
            }
        }

        Ok(coupon)
    }

    /// Item discount of a validated coupon. Pure; same inputs give the same amount.
    pub fn compute_discount(coupon: &Coupon, subtotal: &Money) -> Result<Money, CommerceError> {
        coupon.compute_discount(subtotal)
    }

    /// Evaluate the coupon applied to a cart for display.
    ///
    /// A coupon that no longer validates becomes a warning, not an error.
    pub async fn evaluate_in(
        &self,
        tx: &mut dyn Transaction,
        cart: &Cart,
        identity: &Identity,
    ) -> Result<AppliedCoupon, CommerceError> {
        let Some(code) = &cart.coupon_code else {
            return Ok(AppliedCoupon::None);
        };
        let subtotal = cart.subtotal()?;
        match self.validate_in(tx, code, &subtotal, identity).await {
            Ok(coupon) => Ok(AppliedCoupon::Valid {
                discount: coupon.compute_discount(&subtotal)?,
                free_shipping: coupon.waives_shipping(),
            }),
            Err(CommerceError::InvalidCoupon(reason)) => Ok(AppliedCoupon::Invalid(reason)),
            Err(other) => Err(other),
        }
    }
}
