//! Checkout orchestrator.
//!
//! Validation runs first with no transaction held. Reservation, order
//! creation, coupon redemption and cart clearing then run in one
//! transaction; any failure in that phase rolls every step back. Payment
//! initiation and notification happen after commit and never undo the order.

use crate::cart::{Cart, Coupon, CouponCode, CouponRedemption, CouponRejection};
use crate::catalog::{CatalogEntry, SellableUnit};
use crate::checkout::{
    allocate_discount, Address, CheckoutIssue, CheckoutStage, Order, OrderLine, OrderStatus,
    OrderTotals, PaymentMethod, ReservationHold, ReservationState,
};
use crate::clock::Clock;
use crate::error::CommerceError;
use crate::identity::{CartOwner, Identity};
use crate::ids::{AddressId, OrderId, PaymentIntentId, ShippingMethodId, UserId};
use crate::money::Money;
use crate::ports::{Catalog, Notifier, OrderEvent, PaymentGateway, PaymentIntent};
use crate::services::{CouponEngine, InventoryLedger};
use crate::settings::StorefrontSettings;
use crate::store::{Store, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where to ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressSelection {
    Saved { address_id: AddressId },
    Inline { address: Address },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub address: AddressSelection,
    pub shipping_method_id: ShippingMethodId,
    pub payment_method: PaymentMethod,
    /// Overrides the coupon applied to the cart.
    #[serde(default)]
    pub coupon_code: Option<CouponCode>,
    /// Proceed at current catalog prices when they drifted.
    #[serde(default)]
    pub accept_price_changes: bool,
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    /// `AwaitingPayment` or `Placed`.
    pub stage: CheckoutStage,
    /// Intent the client completes with the gateway, for card payments.
    pub payment_intent: Option<PaymentIntent>,
}

/// Lines and prices that passed validation.
struct Validated {
    cart: Cart,
    prices: HashMap<SellableUnit, CatalogEntry>,
    address: Address,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    catalog: Arc<dyn Catalog>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: Arc<StorefrontSettings>,
    coupons: CouponEngine,
    ledger: InventoryLedger,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn Catalog>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: Arc<StorefrontSettings>,
        coupons: CouponEngine,
        ledger: InventoryLedger,
    ) -> Self {
        Self {
            store,
            catalog,
            gateway,
            notifier,
            clock,
            settings,
            coupons,
            ledger,
        }
    }

    /// Turn the caller's cart into an order.
    #[tracing::instrument(
        skip_all,
        fields(user_id = tracing::field::Empty, order_id = tracing::field::Empty)
    )]
    pub async fn checkout(
        &self,
        identity: &Identity,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CommerceError> {
        let user_id = identity.user_id().ok_or(CommerceError::AuthRequired)?.clone();
        tracing::Span::current().record("user_id", tracing::field::display(&user_id));

        let mut stage = CheckoutStage::Validating;
        let validated = match self.validate(&user_id, &request).await {
            Ok(v) => v,
            Err(e) => {
                stage = stage.advance(CheckoutStage::Rejected)?;
                debug!(stage = stage.as_str(), error = %e, "Checkout rejected");
                return Err(e);
            }
        };

        stage = stage.advance(CheckoutStage::Reserving)?;
        let order = match self.place(identity, &user_id, &request, validated).await {
            Ok(order) => order,
            Err(e) => {
                stage = stage.advance(CheckoutStage::Rejected)?;
                debug!(stage = stage.as_str(), error = %e, "Checkout rejected");
                return Err(e);
            }
        };
        stage = stage.advance(CheckoutStage::OrderCreated)?;
        tracing::Span::current().record("order_id", tracing::field::display(&order.id));

        self.notify(OrderEvent::Created {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            user_id: user_id.clone(),
            status: order.status,
        })
        .await;

        let next = if order.status == OrderStatus::PendingPayment {
            CheckoutStage::AwaitingPayment
        } else {
            CheckoutStage::Placed
        };
        stage = stage.advance(next)?;

        info!(
            order_number = %order.order_number,
            status = %order.status,
            total = %order.totals.grand_total,
            stage = stage.as_str(),
            "Order created"
        );

        let (order, payment_intent) = self.initiate_payment(order).await?;
        Ok(CheckoutOutcome {
            order,
            stage,
            payment_intent,
        })
    }

    /// Create a fresh intent for a card order whose initiation failed.
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn retry_payment(
        &self,
        identity: &Identity,
        order_id: &OrderId,
    ) -> Result<CheckoutOutcome, CommerceError> {
        let user_id = identity.user_id().ok_or(CommerceError::AuthRequired)?;
        let order = {
            let mut tx = self.store.begin().await?;
            tx.order(order_id)
                .await?
                .filter(|o| &o.user_id == user_id)
                .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))?
        };
        if order.status != OrderStatus::PendingPayment
            || order.payment_method != PaymentMethod::CreditCard
        {
            return Err(CommerceError::InvalidTransition {
                from: order.status.as_str().to_string(),
                to: "payment initiation".to_string(),
            });
        }

        let (order, payment_intent) = self.initiate_payment(order).await?;
        Ok(CheckoutOutcome {
            order,
            stage: CheckoutStage::AwaitingPayment,
            payment_intent,
        })
    }

    /// Check every line against the catalog and stock with no transaction held.
    ///
    /// All issues are collected before deciding.
    async fn validate(
        &self,
        user_id: &UserId,
        request: &CheckoutRequest,
    ) -> Result<Validated, CommerceError> {
        let cart = {
            let mut tx = self.store.begin().await?;
            tx.cart_for_owner(&CartOwner::User(user_id.clone())).await?
        };
        let cart = match cart {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(CommerceError::Validation("cart is empty".to_string())),
        };

        if self
            .settings
            .shipping_method(&request.shipping_method_id)
            .is_none()
        {
            return Err(CommerceError::ShippingMethodNotFound(
                request.shipping_method_id.to_string(),
            ));
        }

        let mut issues = Vec::new();
        let mut prices = HashMap::new();
        for line in &cart.lines {
            let entry = match self.catalog.entry(&line.unit).await? {
                Some(entry) if entry.is_sellable() => entry,
                _ => {
                    issues.push(CheckoutIssue::Unavailable {
                        unit: line.unit.clone(),
                    });
                    continue;
                }
            };
            if entry.unit_price != line.unit_price {
                issues.push(CheckoutIssue::PriceChanged {
                    unit: line.unit.clone(),
                    old_price: line.unit_price,
                    new_price: entry.unit_price,
                });
            }
            let available = self.ledger.available(&line.unit).await?;
            if available < line.quantity {
                issues.push(CheckoutIssue::InsufficientStock {
                    unit: line.unit.clone(),
                    requested: line.quantity,
                    available,
                });
            }
            prices.insert(line.unit.clone(), entry);
        }

        if issues.iter().any(CheckoutIssue::is_blocking) {
            warn!(cart_id = %cart.id, issues = issues.len(), "Checkout validation failed");
            let stock_only = issues
                .iter()
                .all(|i| matches!(i, CheckoutIssue::InsufficientStock { .. }));
            return Err(if stock_only {
                CommerceError::InsufficientStock { issues }
            } else {
                CommerceError::CheckoutRejected { issues }
            });
        }

        if !issues.is_empty() && !request.accept_price_changes {
            self.reprice(&cart, &prices).await?;
            return Err(CommerceError::PriceChanged { issues });
        }

        let address = self.resolve_address(user_id, &request.address).await?;
        Ok(Validated {
            cart,
            prices,
            address,
        })
    }

    /// Move drifted lines to the catalog price so the next attempt matches.
    async fn reprice(
        &self,
        snapshot: &Cart,
        prices: &HashMap<SellableUnit, CatalogEntry>,
    ) -> Result<(), CommerceError> {
        let mut tx = self.store.begin().await?;
        let Some(mut cart) = tx.cart(&snapshot.id).await? else {
            return Ok(());
        };
        for line in cart.lines.iter_mut() {
            if let Some(entry) = prices.get(&line.unit) {
                line.unit_price = entry.unit_price;
            }
        }
        cart.touch(self.clock.now());
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn resolve_address(
        &self,
        user_id: &UserId,
        selection: &AddressSelection,
    ) -> Result<Address, CommerceError> {
        match selection {
            AddressSelection::Saved { address_id } => {
                let mut tx = self.store.begin().await?;
                tx.address(address_id)
                    .await?
                    .filter(|a| &a.user_id == user_id)
                    .map(|a| a.address)
                    .ok_or_else(|| CommerceError::AddressNotFound(address_id.to_string()))
            }
            AddressSelection::Inline { address } => {
                let missing = address.missing_fields();
                if !missing.is_empty() {
                    return Err(CommerceError::Validation(format!(
                        "address is missing: {}",
                        missing.join(", ")
                    )));
                }
                Ok(address.clone())
            }
        }
    }

    /// Reserve, write the order, redeem the coupon and clear the cart atomically.
    async fn place(
        &self,
        identity: &Identity,
        user_id: &UserId,
        request: &CheckoutRequest,
        validated: Validated,
    ) -> Result<Order, CommerceError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut cart = tx
            .cart(&validated.cart.id)
            .await?
            .filter(|c| c.same_contents(&validated.cart))
            .ok_or_else(|| {
                CommerceError::ConcurrencyConflict("cart changed during checkout".to_string())
            })?;

        // Snapshot lines at the validated catalog prices.
        let mut lines = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let entry = validated.prices.get(&line.unit).ok_or_else(|| {
                CommerceError::Internal(format!("no validated price for {}", line.unit))
            })?;
            lines.push(OrderLine {
                unit: line.unit.clone(),
                name: entry.name.clone(),
                quantity: line.quantity,
                unit_price: entry.unit_price,
                discount_share: Money::zero(cart.currency),
                line_total: entry.unit_price.try_multiply(line.quantity)?,
            });
        }
        let subtotal = Money::try_sum(lines.iter().map(|l| &l.line_total), cart.currency)?;

        let coupon_code = request.coupon_code.clone().or_else(|| cart.coupon_code.clone());
        let coupon: Option<Coupon> = match &coupon_code {
            Some(code) => Some(
                self.coupons
                    .validate_in(tx.as_mut(), code, &subtotal, identity)
                    .await?,
            ),
            None => None,
        };
        let discount = match &coupon {
            Some(c) => CouponEngine::compute_discount(c, &subtotal)?,
            None => Money::zero(cart.currency),
        };
        let shares = allocate_discount(
            &lines.iter().map(|l| l.line_total).collect::<Vec<_>>(),
            discount,
        )?;
        for (line, share) in lines.iter_mut().zip(shares) {
            line.discount_share = share;
        }

        let reservations = self.reserve_all(tx.as_mut(), &lines).await?;

        let method = self
            .settings
            .shipping_method(&request.shipping_method_id)
            .ok_or_else(|| {
                CommerceError::ShippingMethodNotFound(request.shipping_method_id.to_string())
            })?;
        let shipping = method.quote(coupon.as_ref().is_some_and(Coupon::waives_shipping));
        let totals =
            OrderTotals::compute(subtotal, discount, shipping.rate, self.settings.tax_rate_bps)?;

        let id = OrderId::generate();
        let mut order = Order {
            order_number: Order::generate_order_number(&id, now),
            id,
            user_id: user_id.clone(),
            status: OrderStatus::PendingPayment,
            lines,
            reservations,
            reservation_state: ReservationState::Held,
            shipping_address: validated.address,
            shipping,
            payment_method: request.payment_method,
            payment_intent_id: None,
            coupon_code: coupon.as_ref().map(|c| c.code.clone()),
            currency: cart.currency,
            totals,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            cancellation_reason: None,
        };

        let settled = request.payment_method.flow().status_on_create();
        if settled != order.status {
            order.transition(settled, now)?;
        }
        tx.insert_order(&order).await?;

        if let Some(coupon) = &coupon {
            if !tx.increment_coupon_usage(&coupon.code).await? {
                return Err(CommerceError::InvalidCoupon(CouponRejection::UsageExhausted));
            }
            tx.record_redemption(&CouponRedemption {
                code: coupon.code.clone(),
                user_id: user_id.clone(),
                order_id: order.id.clone(),
                redeemed_at: now,
            })
            .await?;
        }

        cart.clear(now);
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Reserve every line in unit order. On any shortfall, release the holds
    /// already taken and report every line that fell short.
    async fn reserve_all(
        &self,
        tx: &mut dyn Transaction,
        lines: &[OrderLine],
    ) -> Result<Vec<ReservationHold>, CommerceError> {
        let mut wanted: Vec<_> = lines.iter().map(|l| (l.unit.clone(), l.quantity)).collect();
        wanted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut held = Vec::with_capacity(wanted.len());
        let mut issues = Vec::new();
        for (unit, quantity) in wanted {
            match InventoryLedger::reserve_in(tx, &unit, quantity).await {
                Ok(()) => held.push(ReservationHold { unit, quantity }),
                Err(CommerceError::InsufficientStock { issues: mut short }) => {
                    issues.append(&mut short)
                }
                Err(other) => return Err(other),
            }
        }

        if !issues.is_empty() {
            for hold in &held {
                InventoryLedger::release_in(tx, &hold.unit, hold.quantity).await?;
            }
            warn!(
                released = held.len(),
                short = issues.len(),
                "Reservation failed; released partial holds"
            );
            return Err(CommerceError::InsufficientStock { issues });
        }
        Ok(held)
    }

    /// Run the payment method's post-commit step and record the intent.
    async fn initiate_payment(
        &self,
        order: Order,
    ) -> Result<(Order, Option<PaymentIntent>), CommerceError> {
        let flow = order.payment_method.flow();
        match flow.initiate(self.gateway.as_ref(), &order).await {
            Ok(None) => Ok((order, None)),
            Ok(Some(intent)) => {
                let order = self.attach_intent(&order.id, &intent.id).await?;
                Ok((order, Some(intent)))
            }
            Err(e) => {
                warn!(
                    order_id = %order.id,
                    error = %e,
                    "Payment initiation failed; order left pending"
                );
                Err(CommerceError::PaymentInitiation {
                    order_id: order.id.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn attach_intent(
        &self,
        order_id: &OrderId,
        intent_id: &PaymentIntentId,
    ) -> Result<Order, CommerceError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .order(order_id)
            .await?
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))?;
        order.payment_intent_id = Some(intent_id.clone());
        order.updated_at = self.clock.now();
        tx.update_order(&order).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn notify(&self, event: OrderEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(order_id = %event.order_id(), error = %e, "Order notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductStatus;
    use crate::ids::LineId;
    use crate::money::Currency;
    use crate::services::testing::{checkout_request, Fixture};

    fn usd(cents: i64) -> Money {
        Money::new(cents, Currency::USD)
    }

    fn unit(product: &str) -> SellableUnit {
        SellableUnit::product(product)
    }

    #[tokio::test]
    async fn test_save10_cash_on_delivery_end_to_end() {
        let fx = Fixture::new().await;
        fx.stock("lamp", 5_000, 10).await;
        fx.coupon(Coupon::percentage("SAVE10", 10)).await;
        let user = fx.user("user_1");
        let carts = &fx.storefront.carts;
        carts.add_line(&user, &unit("lamp"), 2).await.unwrap();
        let view = carts
            .apply_coupon(&user, &CouponCode::new("SAVE10"))
            .await
            .unwrap()
            .cart;
        assert_eq!(view.subtotal, usd(10_000));
        assert_eq!(view.discount, usd(1_000));
        assert_eq!(view.total, usd(9_000));

        let outcome = fx
            .storefront
            .checkout
            .checkout(&user, checkout_request(PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        let order = &outcome.order;

        assert_eq!(outcome.stage, CheckoutStage::Placed);
        assert!(outcome.payment_intent.is_none());
        assert_eq!(order.status, OrderStatus::CashOnDeliveryConfirmed);
        assert_eq!(order.totals.subtotal, usd(10_000));
        assert_eq!(order.totals.discount_total, usd(1_000));
        assert_eq!(order.totals.shipping_total, usd(599));
        assert_eq!(order.totals.tax_total, usd(0));
        assert_eq!(order.totals.grand_total, usd(9_000 + 599));
        assert_eq!(order.lines[0].discount_share, usd(1_000));
        assert_eq!(order.reservations, vec![ReservationHold { unit: unit("lamp"), quantity: 2 }]);

        assert_eq!(fx.storefront.ledger.available(&unit("lamp")).await.unwrap(), 8);

        let view = carts.view(&user).await.unwrap().cart;
        assert!(view.lines.is_empty());
        assert!(view.coupon_code.is_none());

        let mut tx = fx.store.begin().await.unwrap();
        let coupon = tx.coupon(&CouponCode::new("SAVE10")).await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 1);
        assert_eq!(
            tx.redemption_count(&coupon.code, &UserId::new("user_1"))
                .await
                .unwrap(),
            1
        );
        drop(tx);

        let events = fx.notifier.events.lock().unwrap();
        assert!(matches!(events.as_slice(), [OrderEvent::Created { .. }]));
    }

    #[tokio::test]
    async fn test_card_checkout_awaits_payment_with_intent() {
        let fx = Fixture::new().await;
        fx.stock("lamp", 2_000, 5).await;
        let outcome = fx
            .place_order("user_1", "lamp", 1, PaymentMethod::CreditCard)
            .await;

        assert_eq!(outcome.stage, CheckoutStage::AwaitingPayment);
        assert_eq!(outcome.order.status, OrderStatus::PendingPayment);
        let intent = outcome.payment_intent.expect("intent");
        assert_eq!(outcome.order.payment_intent_id, Some(intent.id.clone()));
        assert_eq!(intent.amount, outcome.order.totals.grand_total);
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_pending_order() {
        let fx = Fixture::new().await;
        fx.stock("lamp", 2_000, 5).await;
        let user = fx.user("user_1");
        fx.storefront
            .carts
            .add_line(&user, &unit("lamp"), 1)
            .await
            .unwrap();

        fx.gateway.set_unavailable(true);
        let err = fx
            .storefront
            .checkout
            .checkout(&user, checkout_request(PaymentMethod::CreditCard))
            .await
            .unwrap_err();
        let order_id = match err {
            CommerceError::PaymentInitiation { order_id, .. } => order_id,
            other => panic!("unexpected error: {other:?}"),
        };

        let order = fx.storefront.orders.get(&user, &order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert!(order.payment_intent_id.is_none());
        assert_eq!(fx.inventory("lamp").await.reserved, 1);

        fx.gateway.set_unavailable(false);
        let retried = fx
            .storefront
            .checkout
            .retry_payment(&user, &order_id)
            .await
            .unwrap();
        assert!(retried.payment_intent.is_some());
        assert!(retried.order.payment_intent_id.is_some());
    }

    #[tokio::test]
    async fn test_retry_payment_rejects_cash_orders() {
        let fx = Fixture::new().await;
        fx.stock("lamp", 2_000, 5).await;
        let outcome = fx
            .place_order("user_1", "lamp", 1, PaymentMethod::CashOnDelivery)
            .await;
        let err = fx
            .storefront
            .checkout
            .retry_payment(&fx.user("user_1"), &outcome.order.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_partial_reservation_is_unwound() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 10).await;
        fx.stock("b", 1_000, 1).await;
        let line = |product: &str, quantity: i64| OrderLine {
            unit: unit(product),
            name: product.to_string(),
            quantity,
            unit_price: usd(1_000),
            discount_share: usd(0),
            line_total: usd(1_000 * quantity),
        };

        let mut tx = fx.store.begin().await.unwrap();
        let err = fx
            .storefront
            .checkout
            .reserve_all(tx.as_mut(), &[line("a", 3), line("b", 2)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommerceError::InsufficientStock { ref issues } if issues.len() == 1
        ));
        assert_eq!(tx.inventory(&unit("a")).await.unwrap().unwrap().reserved, 0);
        drop(tx);

        assert_eq!(fx.inventory("a").await.reserved, 0);
        assert_eq!(fx.inventory("b").await.reserved, 0);
    }

    #[tokio::test]
    async fn test_validation_reports_every_issue() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        fx.stock("b", 1_000, 5).await;
        fx.stock("c", 1_000, 5).await;
        let user = fx.user("user_1");
        let carts = &fx.storefront.carts;
        carts.add_line(&user, &unit("a"), 4).await.unwrap();
        carts.add_line(&user, &unit("b"), 1).await.unwrap();
        carts.add_line(&user, &unit("c"), 1).await.unwrap();

        fx.storefront.ledger.set_stock(&unit("a"), 2).await.unwrap();
        fx.set_status("b", ProductStatus::Unavailable).await;
        fx.set_price("c", 1_100).await;

        let err = fx
            .storefront
            .checkout
            .checkout(&user, checkout_request(PaymentMethod::CashOnDelivery))
            .await
            .unwrap_err();
        let issues = match err {
            CommerceError::CheckoutRejected { issues } => issues,
            other => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(issues.len(), 3);
        assert!(issues.contains(&CheckoutIssue::InsufficientStock {
            unit: unit("a"),
            requested: 4,
            available: 2
        }));
        assert!(issues.contains(&CheckoutIssue::Unavailable { unit: unit("b") }));
        assert_eq!(fx.inventory("a").await.reserved, 0);
    }

    #[tokio::test]
    async fn test_stock_only_shortfall_is_insufficient_stock() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        let user = fx.user("user_1");
        fx.storefront.carts.add_line(&user, &unit("a"), 5).await.unwrap();
        fx.storefront.ledger.set_stock(&unit("a"), 3).await.unwrap();

        let err = fx
            .storefront
            .checkout
            .checkout(&user, checkout_request(PaymentMethod::CashOnDelivery))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_STOCK");
    }

    #[tokio::test]
    async fn test_price_drift_requires_confirmation() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        let user = fx.user("user_1");
        fx.storefront.carts.add_line(&user, &unit("a"), 2).await.unwrap();
        fx.set_price("a", 1_200).await;

        let err = fx
            .storefront
            .checkout
            .checkout(&user, checkout_request(PaymentMethod::CashOnDelivery))
            .await
            .unwrap_err();
        match err {
            CommerceError::PriceChanged { issues } => assert_eq!(
                issues,
                vec![CheckoutIssue::PriceChanged {
                    unit: unit("a"),
                    old_price: usd(1_000),
                    new_price: usd(1_200)
                }]
            ),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fx.inventory("a").await.reserved, 0);

        let view = fx.storefront.carts.view(&user).await.unwrap().cart;
        assert_eq!(view.lines[0].unit_price, usd(1_200));

        let outcome = fx
            .storefront
            .checkout
            .checkout(&user, checkout_request(PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        assert_eq!(outcome.order.totals.subtotal, usd(2_400));
    }

    #[tokio::test]
    async fn test_accepting_price_changes_uses_catalog_price() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        let user = fx.user("user_1");
        fx.storefront.carts.add_line(&user, &unit("a"), 1).await.unwrap();
        fx.set_price("a", 900).await;

        let mut request = checkout_request(PaymentMethod::CashOnDelivery);
        request.accept_price_changes = true;
        let outcome = fx.storefront.checkout.checkout(&user, request).await.unwrap();
        assert_eq!(outcome.order.lines[0].unit_price, usd(900));
    }

    #[tokio::test]
    async fn test_order_snapshot_ignores_later_price_changes() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        let outcome = fx
            .place_order("user_1", "a", 3, PaymentMethod::CashOnDelivery)
            .await;

        fx.set_price("a", 9_999).await;
        let stored = fx
            .storefront
            .orders
            .get(&fx.user("user_1"), &outcome.order.id)
            .await
            .unwrap();
        assert_eq!(stored.lines[0].unit_price, usd(1_000));
        assert_eq!(stored.lines[0].line_total, usd(3_000));
        assert_eq!(stored.totals, outcome.order.totals);
    }

    #[tokio::test]
    async fn test_checkout_requires_authentication() {
        let fx = Fixture::new().await;
        let err = fx
            .storefront
            .checkout
            .checkout(
                &Identity::anonymous(None),
                checkout_request(PaymentMethod::CashOnDelivery),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::AuthRequired));
    }

    #[tokio::test]
    async fn test_empty_cart_and_unknown_shipping() {
        let fx = Fixture::new().await;
        let user = fx.user("user_1");
        let err = fx
            .storefront
            .checkout
            .checkout(&user, checkout_request(PaymentMethod::CashOnDelivery))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));

        fx.stock("a", 1_000, 5).await;
        fx.storefront.carts.add_line(&user, &unit("a"), 1).await.unwrap();
        let mut request = checkout_request(PaymentMethod::CashOnDelivery);
        request.shipping_method_id = "teleport".into();
        let err = fx.storefront.checkout.checkout(&user, request).await.unwrap_err();
        assert!(matches!(err, CommerceError::ShippingMethodNotFound(_)));
    }

    #[tokio::test]
    async fn test_address_resolution() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        let user = fx.user("user_1");
        fx.storefront.carts.add_line(&user, &unit("a"), 1).await.unwrap();

        let foreign = fx.saved_address("user_2").await;
        let mut request = checkout_request(PaymentMethod::CashOnDelivery);
        request.address = AddressSelection::Saved { address_id: foreign };
        let err = fx.storefront.checkout.checkout(&user, request).await.unwrap_err();
        assert!(matches!(err, CommerceError::AddressNotFound(_)));

        let mut request = checkout_request(PaymentMethod::CashOnDelivery);
        request.address = AddressSelection::Inline {
            address: Address::default(),
        };
        let err = fx.storefront.checkout.checkout(&user, request).await.unwrap_err();
        assert!(matches!(err, CommerceError::Validation(ref m) if m.contains("line1")));

        let own = fx.saved_address("user_1").await;
        let mut request = checkout_request(PaymentMethod::CashOnDelivery);
        request.address = AddressSelection::Saved { address_id: own };
        let outcome = fx.storefront.checkout.checkout(&user, request).await.unwrap();
        assert_eq!(outcome.order.shipping_address.city, "London");
    }

    #[tokio::test]
    async fn test_free_shipping_coupon_waives_eligible_method() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        fx.coupon(Coupon::free_shipping("SHIPFREE")).await;
        let user = fx.user("user_1");
        fx.storefront.carts.add_line(&user, &unit("a"), 1).await.unwrap();

        let mut request = checkout_request(PaymentMethod::CashOnDelivery);
        request.coupon_code = Some(CouponCode::new("shipfree"));
        let outcome = fx.storefront.checkout.checkout(&user, request).await.unwrap();
        assert!(outcome.order.shipping.waived);
        assert_eq!(outcome.order.totals.shipping_total, usd(0));
        assert_eq!(outcome.order.totals.discount_total, usd(0));
        assert_eq!(outcome.order.totals.grand_total, usd(1_000));
    }

    #[tokio::test]
    async fn test_tax_on_discounted_subtotal() {
        let mut settings = StorefrontSettings::default();
        settings.tax_rate_bps = 1_000;
        settings.shipping_methods = vec![crate::checkout::ShippingMethod::new(
            "standard",
            "Standard",
            usd(0),
        )];
        let fx = Fixture::with_settings(settings).await;
        fx.stock("a", 5_000, 5).await;
        fx.coupon(Coupon::percentage("SAVE10", 10)).await;
        let user = fx.user("user_1");
        fx.storefront.carts.add_line(&user, &unit("a"), 2).await.unwrap();

        let mut request = checkout_request(PaymentMethod::CashOnDelivery);
        request.coupon_code = Some(CouponCode::new("SAVE10"));
        let outcome = fx.storefront.checkout.checkout(&user, request).await.unwrap();
        assert_eq!(outcome.order.totals.tax_total, usd(900));
        assert_eq!(outcome.order.totals.grand_total, usd(9_900));
    }

    #[tokio::test]
    async fn test_exhausted_coupon_rolls_back_checkout() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        let mut coupon = Coupon::percentage("ONCE", 10);
        coupon.usage_limit = Some(1);
        fx.coupon(coupon.clone()).await;
        let user = fx.user("user_1");
        fx.storefront.carts.add_line(&user, &unit("a"), 1).await.unwrap();
        fx.storefront
            .carts
            .apply_coupon(&user, &CouponCode::new("ONCE"))
            .await
            .unwrap();

        coupon.used_count = 1;
        fx.coupon(coupon).await;

        let err = fx
            .storefront
            .checkout
            .checkout(&user, checkout_request(PaymentMethod::CashOnDelivery))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommerceError::InvalidCoupon(CouponRejection::UsageExhausted)
        ));
        assert_eq!(fx.inventory("a").await.reserved, 0);
        let view = fx.storefront.carts.view(&user).await.unwrap().cart;
        assert_eq!(view.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_order() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        fx.notifier
            .failing
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let outcome = fx
            .place_order("user_1", "a", 1, PaymentMethod::CashOnDelivery)
            .await;
        let stored = fx
            .storefront
            .orders
            .get(&fx.user("user_1"), &outcome.order.id)
            .await
            .unwrap();
        assert_eq!(stored.status, OrderStatus::CashOnDeliveryConfirmed);
    }

    #[tokio::test]
    async fn test_cart_changed_mid_checkout_is_conflict() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 5).await;
        let user = fx.user("user_1");
        fx.storefront.carts.add_line(&user, &unit("a"), 1).await.unwrap();
        let user_id = UserId::new("user_1");
        let validated = fx
            .storefront
            .checkout
            .validate(&user_id, &checkout_request(PaymentMethod::CashOnDelivery))
            .await
            .unwrap();

        let line_id: LineId = validated.cart.lines[0].id.clone();
        fx.storefront
            .carts
            .update_quantity(&user, &line_id, 2)
            .await
            .unwrap();

        let err = fx
            .storefront
            .checkout
            .place(
                &user,
                &user_id,
                &checkout_request(PaymentMethod::CashOnDelivery),
                validated,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::ConcurrencyConflict(_)));
        assert!(err.is_retryable());
        assert_eq!(fx.inventory("a").await.reserved, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_for_last_unit() {
        let fx = Fixture::new().await;
        fx.stock("a", 1_000, 1).await;
        let buyers = ["user_1", "user_2", "user_3"];
        for buyer in buyers {
            fx.storefront
                .carts
                .add_line(&fx.user(buyer), &unit("a"), 1)
                .await
                .unwrap();
        }

        let handles: Vec<_> = buyers
            .iter()
            .map(|buyer| {
                let checkout = fx.storefront.checkout.clone();
                let identity = fx.user(buyer);
                tokio::spawn(async move {
                    checkout
                        .checkout(&identity, checkout_request(PaymentMethod::CashOnDelivery))
                        .await
                })
            })
            .collect();

        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        let placed = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(CommerceError::InsufficientStock { .. })))
            .count();
        assert_eq!(placed, 1);
        assert_eq!(short, 2);

        let record = fx.inventory("a").await;
        assert_eq!(record.reserved, 1);
        assert!(record.is_consistent());
    }
}
