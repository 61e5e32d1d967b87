//! Order lifecycle after checkout.

use crate::checkout::{CheckoutStage, Order, OrderStatus, ReservationState};
use crate::clock::Clock;
use crate::error::CommerceError;
use crate::identity::Identity;
use crate::ids::{OrderId, PaymentIntentId};
use crate::ports::{IntentStatus, Notifier, OrderEvent, PaymentGateway};
use crate::services::InventoryLedger;
use crate::settings::StorefrontSettings;
use crate::store::{Store, Transaction};
use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

/// Reason recorded when a pending card order times out.
pub const PAYMENT_TIMEOUT_REASON: &str = "payment timeout";

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: Arc<StorefrontSettings>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: Arc<StorefrontSettings>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
            settings,
        }
    }

    /// Fetch an order owned by the caller. Other users' orders are reported missing.
    pub async fn get(&self, identity: &Identity, id: &OrderId) -> Result<Order, CommerceError> {
        let mut tx = self.store.begin().await?;
        owned_order(tx.as_mut(), identity, id).await
    }

    /// Cancel on the customer's behalf, releasing the reservation.
    #[tracing::instrument(skip_all, fields(order_id = %id))]
    pub async fn cancel(
        &self,
        identity: &Identity,
        id: &OrderId,
        reason: &str,
    ) -> Result<Order, CommerceError> {
        let mut tx = self.store.begin().await?;
        let mut order = owned_order(tx.as_mut(), identity, id).await?;
        self.cancel_in(tx.as_mut(), &mut order, reason).await?;
        tx.commit().await?;
        self.notify_cancelled(&order).await;
        Ok(order)
    }

    /// Apply the gateway's verdict for an order's payment intent.
    ///
    /// The verdict comes from the gateway, never from the caller. `SUCCEEDED`
    /// moves the order to `PAID`; `FAILED` cancels it and releases the
    /// reservation; `PENDING` leaves it untouched. Repeating an
    /// already-applied verdict is a no-op.
    #[tracing::instrument(skip_all, fields(order_id = %id, intent_id = %intent_id))]
    pub async fn confirm_payment(
        &self,
        id: &OrderId,
        intent_id: &PaymentIntentId,
    ) -> Result<Order, CommerceError> {
        let order = {
            let mut tx = self.store.begin().await?;
            tx.order(id)
                .await?
                .ok_or_else(|| CommerceError::OrderNotFound(id.to_string()))?
        };
        if order.payment_intent_id.as_ref() != Some(intent_id) {
            return Err(CommerceError::Validation(
                "payment intent does not belong to this order".to_string(),
            ));
        }

        // No transaction is held across the gateway call.
        let verdict = self.gateway.intent_status(intent_id).await.map_err(|e| {
            warn!(error = %e, "Payment intent lookup failed");
            CommerceError::PaymentVerification(e.to_string())
        })?;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .order(id)
            .await?
            .ok_or_else(|| CommerceError::OrderNotFound(id.to_string()))?;
        match (order.status, verdict) {
            (_, IntentStatus::Pending)
            | (OrderStatus::Paid, IntentStatus::Succeeded)
            | (OrderStatus::Cancelled, IntentStatus::Failed) => return Ok(order),
            (_, IntentStatus::Succeeded) => {
                order.transition(OrderStatus::Paid, self.clock.now())?;
                tx.update_order(&order).await?;
                tx.commit().await?;
                info!(order_number = %order.order_number, "Payment confirmed");
            }
            (_, IntentStatus::Failed) => {
                self.cancel_in(tx.as_mut(), &mut order, "payment failed").await?;
                tx.commit().await?;
                warn!(order_number = %order.order_number, "Payment failed; order cancelled");
                self.notify_cancelled(&order).await;
            }
        }
        Ok(order)
    }

    /// Ship the order; the reservation becomes a permanent stock deduction.
    #[tracing::instrument(skip_all, fields(order_id = %id))]
    pub async fn fulfil(&self, id: &OrderId) -> Result<Order, CommerceError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .order(id)
            .await?
            .ok_or_else(|| CommerceError::OrderNotFound(id.to_string()))?;

        order.transition(OrderStatus::Fulfilled, self.clock.now())?;
        if order.holds_reservation() {
            for hold in &order.reservations {
                InventoryLedger::commit_in(tx.as_mut(), &hold.unit, hold.quantity).await?;
            }
            order.reservation_state = ReservationState::Committed;
        }
        tx.update_order(&order).await?;
        tx.commit().await?;
        info!(order_number = %order.order_number, "Order fulfilled");
        Ok(order)
    }

    /// Cancel `PENDING_PAYMENT` orders older than the configured timeout.
    pub async fn expire_pending(&self) -> Result<u64, CommerceError> {
        self.expire_pending_older_than(self.settings.pending_payment_timeout)
            .await
    }

    /// Cancel `PENDING_PAYMENT` orders older than `timeout`, one transaction each.
    ///
    /// Returns the number cancelled. Safe to run repeatedly.
    #[tracing::instrument(skip_all, fields(timeout_minutes = timeout.num_minutes()))]
    pub async fn expire_pending_older_than(&self, timeout: Duration) -> Result<u64, CommerceError> {
        let cutoff = self.clock.now() - timeout;
        let candidates = {
            let mut tx = self.store.begin().await?;
            tx.orders_with_status_before(OrderStatus::PendingPayment, cutoff)
                .await?
        };

        let mut expired = 0;
        for id in candidates {
            let mut tx = self.store.begin().await?;
            let Some(mut order) = tx.order(&id).await? else {
                continue;
            };
            // Confirmed between listing and now.
            if order.status != OrderStatus::PendingPayment {
                continue;
            }
            self.cancel_in(tx.as_mut(), &mut order, PAYMENT_TIMEOUT_REASON)
                .await?;
            tx.commit().await?;
            self.notify_cancelled(&order).await;
            expired += 1;
        }

        info!(expired, cutoff = %cutoff, "Expired pending-payment orders");
        Ok(expired)
    }

    /// Cancel inside `tx`. Returns the checkout stage the order ends in when
    /// its hold was released.
    async fn cancel_in(
        &self,
        tx: &mut dyn Transaction,
        order: &mut Order,
        reason: &str,
    ) -> Result<Option<CheckoutStage>, CommerceError> {
        let stage = CheckoutStage::after_checkout(order.status);
        let held = order.holds_reservation();
        order.cancel(reason, self.clock.now())?;
        if held {
            for hold in &order.reservations {
                InventoryLedger::release_in(tx, &hold.unit, hold.quantity).await?;
            }
        }
        let released = match stage {
            Some(stage) if held => Some(stage.advance(CheckoutStage::ReservationReleased)?),
            _ => None,
        };
        tx.update_order(order).await?;
        warn!(
            order_id = %order.id,
            reason,
            stage = released.map(|s| s.as_str()),
            "Order cancelled"
        );
        Ok(released)
    }

    async fn notify_cancelled(&self, order: &Order) {
        let event = OrderEvent::Cancelled {
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            reason: order.cancellation_reason.clone().unwrap_or_default(),
        };
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(order_id = %order.id, error = %e, "Order notification failed");
        }
    }
}

async fn owned_order(
    tx: &mut dyn Transaction,
    identity: &Identity,
    id: &OrderId,
) -> Result<Order, CommerceError> {
    let user_id = identity.user_id().ok_or(CommerceError::AuthRequired)?;
    tx.order(id)
        .await?
        .filter(|o| &o.user_id == user_id)
        .ok_or_else(|| CommerceError::OrderNotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::PaymentMethod;
    use crate::services::testing::Fixture;

    async fn card_order(fx: &Fixture) -> Order {
        fx.stock("lamp", 2_500, 5).await;
        fx.place_order("user_1", "lamp", 2, PaymentMethod::CreditCard)
            .await
            .order
    }

    #[tokio::test]
    async fn test_cancel_releases_reservation() {
        let fx = Fixture::new().await;
        let order = card_order(&fx).await;
        assert_eq!(fx.inventory("lamp").await.reserved, 2);

        let cancelled = fx
            .storefront
            .orders
            .cancel(&fx.user("user_1"), &order.id, "changed my mind")
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.reservation_state, ReservationState::Released);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("changed my mind"));

        let record = fx.inventory("lamp").await;
        assert_eq!(record.reserved, 0);
        assert_eq!(record.quantity, 5);

        let events = fx.notifier.events.lock().unwrap();
        assert!(matches!(events.last(), Some(OrderEvent::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancellation_reaches_reservation_released() {
        let fx = Fixture::new().await;
        let order = card_order(&fx).await;
        let orders = &fx.storefront.orders;

        let mut tx = fx.storefront.store.begin().await.unwrap();
        let mut stored = tx.order(&order.id).await.unwrap().unwrap();
        let stage = orders
            .cancel_in(tx.as_mut(), &mut stored, "changed my mind")
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(stage, Some(CheckoutStage::ReservationReleased));
        assert_eq!(fx.inventory("lamp").await.reserved, 0);

        // Nothing left to release the second time round.
        let mut tx = fx.storefront.store.begin().await.unwrap();
        let mut stored = tx.order(&order.id).await.unwrap().unwrap();
        let err = orders
            .cancel_in(tx.as_mut(), &mut stored, "again")
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_orders_are_private_to_their_owner() {
        let fx = Fixture::new().await;
        let order = card_order(&fx).await;
        let orders = &fx.storefront.orders;

        let err = orders.get(&fx.user("user_2"), &order.id).await.unwrap_err();
        assert!(matches!(err, CommerceError::OrderNotFound(_)));
        let err = orders
            .cancel(&fx.user("user_2"), &order.id, "not mine")
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::OrderNotFound(_)));
        let err = orders
            .get(&Identity::anonymous(None), &order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::AuthRequired));
        assert_eq!(fx.inventory("lamp").await.reserved, 2);
    }

    #[tokio::test]
    async fn test_payment_success_then_fulfilment_commits_stock() {
        let fx = Fixture::new().await;
        let order = card_order(&fx).await;
        let intent = order.payment_intent_id.clone().unwrap();
        let orders = &fx.storefront.orders;

        fx.gateway
            .set_intent_status(&intent, IntentStatus::Succeeded)
            .unwrap();
        let paid = orders.confirm_payment(&order.id, &intent).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(fx.inventory("lamp").await.reserved, 2);

        // A repeated webhook changes nothing.
        let again = orders.confirm_payment(&order.id, &intent).await.unwrap();
        assert_eq!(again.status, OrderStatus::Paid);

        let fulfilled = orders.fulfil(&order.id).await.unwrap();
        assert_eq!(fulfilled.status, OrderStatus::Fulfilled);
        assert_eq!(fulfilled.reservation_state, ReservationState::Committed);
        let record = fx.inventory("lamp").await;
        assert_eq!(record.quantity, 3);
        assert_eq!(record.reserved, 0);

        let err = orders
            .cancel(&fx.user("user_1"), &order.id, "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_payment_failure_cancels_and_releases() {
        let fx = Fixture::new().await;
        let order = card_order(&fx).await;
        let intent = order.payment_intent_id.clone().unwrap();
        let orders = &fx.storefront.orders;

        fx.gateway
            .set_intent_status(&intent, IntentStatus::Failed)
            .unwrap();
        let failed = orders.confirm_payment(&order.id, &intent).await.unwrap();
        assert_eq!(failed.status, OrderStatus::Cancelled);
        assert_eq!(failed.cancellation_reason.as_deref(), Some("payment failed"));
        assert_eq!(fx.inventory("lamp").await.reserved, 0);

        let again = orders.confirm_payment(&order.id, &intent).await.unwrap();
        assert_eq!(again.status, OrderStatus::Cancelled);
        assert_eq!(fx.inventory("lamp").await.reserved, 0);

        // A late success cannot revive a cancelled order.
        fx.gateway
            .set_intent_status(&intent, IntentStatus::Succeeded)
            .unwrap();
        let err = orders.confirm_payment(&order.id, &intent).await.unwrap_err();
        assert!(matches!(err, CommerceError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_confirm_payment_trusts_only_the_gateway() {
        let fx = Fixture::new().await;
        let order = card_order(&fx).await;
        let intent = order.payment_intent_id.clone().unwrap();
        let orders = &fx.storefront.orders;

        // The customer has not paid; confirming changes nothing.
        let pending = orders.confirm_payment(&order.id, &intent).await.unwrap();
        assert_eq!(pending.status, OrderStatus::PendingPayment);
        let stored = orders.get(&fx.user("user_1"), &order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::PendingPayment);
        assert_eq!(fx.inventory("lamp").await.reserved, 2);

        fx.gateway.set_unavailable(true);
        let err = orders.confirm_payment(&order.id, &intent).await.unwrap_err();
        assert!(matches!(err, CommerceError::PaymentVerification(_)));
        assert!(err.is_retryable());

        fx.gateway.set_unavailable(false);
        fx.gateway
            .set_intent_status(&intent, IntentStatus::Succeeded)
            .unwrap();
        let paid = orders.confirm_payment(&order.id, &intent).await.unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_confirm_payment_checks_intent() {
        let fx = Fixture::new().await;
        let order = card_order(&fx).await;
        let err = fx
            .storefront
            .orders
            .confirm_payment(&order.id, &PaymentIntentId::new("pi_forged"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));

        let err = fx
            .storefront
            .orders
            .confirm_payment(&OrderId::new("ord_missing"), &PaymentIntentId::new("pi_x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_pending_orders_expire_after_timeout() {
        let fx = Fixture::new().await;
        fx.stock("chair", 10_000, 3).await;
        let card = card_order(&fx).await;
        let cash = fx
            .place_order("user_2", "chair", 1, PaymentMethod::CashOnDelivery)
            .await
            .order;
        let orders = &fx.storefront.orders;

        fx.clock.advance(Duration::minutes(29));
        assert_eq!(orders.expire_pending().await.unwrap(), 0);

        fx.clock.advance(Duration::minutes(2));
        assert_eq!(orders.expire_pending().await.unwrap(), 1);
        assert_eq!(orders.expire_pending().await.unwrap(), 0);

        let expired = orders.get(&fx.user("user_1"), &card.id).await.unwrap();
        assert_eq!(expired.status, OrderStatus::Cancelled);
        assert_eq!(expired.cancellation_reason.as_deref(), Some(PAYMENT_TIMEOUT_REASON));
        assert_eq!(fx.inventory("lamp").await.reserved, 0);

        let untouched = orders.get(&fx.user("user_2"), &cash.id).await.unwrap();
        assert_eq!(untouched.status, OrderStatus::CashOnDeliveryConfirmed);
        assert_eq!(fx.inventory("chair").await.reserved, 1);
    }

    #[tokio::test]
    async fn test_cash_order_can_be_cancelled_before_fulfilment() {
        let fx = Fixture::new().await;
        fx.stock("chair", 10_000, 3).await;
        let order = fx
            .place_order("user_1", "chair", 3, PaymentMethod::CashOnDelivery)
            .await
            .order;
        let chair = crate::catalog::SellableUnit::product("chair");
        assert_eq!(fx.storefront.ledger.available(&chair).await.unwrap(), 0);

        fx.storefront
            .orders
            .cancel(&fx.user("user_1"), &order.id, "refused at door")
            .await
            .unwrap();
        assert_eq!(fx.inventory("chair").await.reserved, 0);
    }
}
