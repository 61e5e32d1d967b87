//! Cart operations behind the cart endpoints.

use crate::cart::{validate_quantity, Cart, CartView, CouponCode};
use crate::catalog::{CatalogEntry, SellableUnit};
use crate::checkout::CheckoutIssue;
use crate::clock::Clock;
use crate::error::CommerceError;
use crate::identity::{CartToken, Identity};
use crate::ids::LineId;
use crate::ports::Catalog;
use crate::services::{CartResolver, CouponEngine, InventoryLedger, ResolvedCart};
use crate::store::{Store, Transaction};
use std::sync::Arc;
use tracing::info;

/// Cart state returned by every cart operation.
#[derive(Debug, Clone)]
pub struct CartResponse {
    pub cart: CartView,
    /// New anonymous credential to hand back to the client.
    pub issued_token: Option<CartToken>,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    resolver: CartResolver,
    coupons: CouponEngine,
}

impl CartService {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
        resolver: CartResolver,
        coupons: CouponEngine,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            resolver,
            coupons,
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn view(&self, identity: &Identity) -> Result<CartResponse, CommerceError> {
        let mut tx = self.store.begin().await?;
        let resolved = self.resolver.resolve_in(tx.as_mut(), identity).await?;
        self.finish(tx, resolved, identity).await
    }

    /// Add `quantity` of `unit` at the current catalog price.
    #[tracing::instrument(skip_all, fields(unit = %unit, qty = quantity))]
    pub async fn add_line(
        &self,
        identity: &Identity,
        unit: &SellableUnit,
        quantity: i64,
    ) -> Result<CartResponse, CommerceError> {
        validate_quantity(quantity)?;
        let entry = self.sellable_entry(unit).await?;

        let mut tx = self.store.begin().await?;
        let mut resolved = self.resolver.resolve_in(tx.as_mut(), identity).await?;
        let already = resolved.cart.line_for(unit).map(|l| l.quantity).unwrap_or(0);
        ensure_stock(tx.as_mut(), unit, already + quantity).await?;

        resolved.cart.add_line(&entry, quantity, self.clock.now())?;
        tx.save_cart(&resolved.cart).await?;
        info!(cart_id = %resolved.cart.id, "Line added");
        self.finish(tx, resolved, identity).await
    }

    #[tracing::instrument(skip_all, fields(line_id = %line_id, qty = quantity))]
    pub async fn update_quantity(
        &self,
        identity: &Identity,
        line_id: &LineId,
        quantity: i64,
    ) -> Result<CartResponse, CommerceError> {
        validate_quantity(quantity)?;
        let mut tx = self.store.begin().await?;
        let mut resolved = self.resolver.resolve_in(tx.as_mut(), identity).await?;
        let unit = resolved
            .cart
            .line(line_id)
            .map(|l| l.unit.clone())
            .ok_or_else(|| CommerceError::LineNotFound(line_id.to_string()))?;
        ensure_stock(tx.as_mut(), &unit, quantity).await?;

        resolved.cart.update_quantity(line_id, quantity, self.clock.now())?;
        tx.save_cart(&resolved.cart).await?;
        self.finish(tx, resolved, identity).await
    }

    #[tracing::instrument(skip_all, fields(line_id = %line_id))]
    pub async fn remove_line(
        &self,
        identity: &Identity,
        line_id: &LineId,
    ) -> Result<CartResponse, CommerceError> {
        let mut tx = self.store.begin().await?;
        let mut resolved = self.resolver.resolve_in(tx.as_mut(), identity).await?;
        resolved.cart.remove_line(line_id, self.clock.now())?;
        tx.save_cart(&resolved.cart).await?;
        self.finish(tx, resolved, identity).await
    }

    /// Attach a coupon after validating it against the current subtotal.
    #[tracing::instrument(skip_all, fields(code = %code))]
    pub async fn apply_coupon(
        &self,
        identity: &Identity,
        code: &CouponCode,
    ) -> Result<CartResponse, CommerceError> {
        if code.is_empty() {
            return Err(CommerceError::Validation("coupon code is required".to_string()));
        }
        let mut tx = self.store.begin().await?;
        let mut resolved = self.resolver.resolve_in(tx.as_mut(), identity).await?;
        let subtotal = resolved.cart.subtotal()?;
        let coupon = self
            .coupons
            .validate_in(tx.as_mut(), code, &subtotal, identity)
            .await?;

        resolved.cart.coupon_code = Some(coupon.code);
        resolved.cart.touch(self.clock.now());
        tx.save_cart(&resolved.cart).await?;
        self.finish(tx, resolved, identity).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn remove_coupon(&self, identity: &Identity) -> Result<CartResponse, CommerceError> {
        let mut tx = self.store.begin().await?;
        let mut resolved = self.resolver.resolve_in(tx.as_mut(), identity).await?;
        if resolved.cart.coupon_code.take().is_some() {
            resolved.cart.touch(self.clock.now());
            tx.save_cart(&resolved.cart).await?;
        }
        self.finish(tx, resolved, identity).await
    }

    async fn sellable_entry(&self, unit: &SellableUnit) -> Result<CatalogEntry, CommerceError> {
        let entry = self
            .catalog
            .entry(unit)
            .await?
            .ok_or_else(|| CommerceError::ProductNotFound(unit.to_string()))?;
        if !entry.is_sellable() {
            return Err(CommerceError::CheckoutRejected {
                issues: vec![CheckoutIssue::Unavailable { unit: unit.clone() }],
            });
        }
        Ok(entry)
    }

    /// Build the view inside the transaction, then commit.
    async fn finish(
        &self,
        mut tx: Box<dyn Transaction>,
        resolved: ResolvedCart,
        identity: &Identity,
    ) -> Result<CartResponse, CommerceError> {
        let view = self.render(tx.as_mut(), &resolved.cart, identity).await?;
        tx.commit().await?;
        Ok(CartResponse {
            cart: view,
            issued_token: resolved.issued_token,
        })
    }

    async fn render(
        &self,
        tx: &mut dyn Transaction,
        cart: &Cart,
        identity: &Identity,
    ) -> Result<CartView, CommerceError> {
        let applied = self.coupons.evaluate_in(tx, cart, identity).await?;
        CartView::build(cart, applied)
    }
}

/// Refuse cart quantities that stock could never cover.
async fn ensure_stock(
    tx: &mut dyn Transaction,
    unit: &SellableUnit,
    wanted: i64,
) -> Result<(), CommerceError> {
    let available = InventoryLedger::available_in(tx, unit).await?;
    if wanted > available {
        return Err(CommerceError::InsufficientStock {
            issues: vec![CheckoutIssue::InsufficientStock {
                unit: unit.clone(),
                requested: wanted,
                available,
            }],
        });
    }
    Ok(())
}
