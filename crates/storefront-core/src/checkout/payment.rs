//! Payment methods.
//!
//! Each method is a [`PaymentFlow`]; the orchestrator never branches on the
//! method itself.

use crate::checkout::{Order, OrderStatus};
use crate::ports::{GatewayError, PaymentGateway, PaymentIntent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        }
    }

    /// The flow implementing this method.
    pub fn flow(&self) -> &'static dyn PaymentFlow {
        match self {
            PaymentMethod::CreditCard => &CardPayment,
            PaymentMethod::CashOnDelivery => &CashOnDelivery,
        }
    }
}

/// How a payment method settles an order.
#[async_trait]
pub trait PaymentFlow: Send + Sync {
    /// Status the order is committed with.
    fn status_on_create(&self) -> OrderStatus;

    /// Runs after the order transaction commits. Returns the intent the
    /// client must complete, if the method needs one.
    async fn initiate(
        &self,
        gateway: &dyn PaymentGateway,
        order: &Order,
    ) -> Result<Option<PaymentIntent>, GatewayError>;
}

/// Card payments wait for the gateway to confirm.
pub struct CardPayment;

#[async_trait]
impl PaymentFlow for CardPayment {
    fn status_on_create(&self) -> OrderStatus {
        OrderStatus::PendingPayment
    }

    async fn initiate(
        &self,
        gateway: &dyn PaymentGateway,
        order: &Order,
    ) -> Result<Option<PaymentIntent>, GatewayError> {
        gateway
            .create_intent(&order.id, order.totals.grand_total)
            .await
            .map(Some)
    }
}

/// Cash on delivery is placed immediately.
pub struct CashOnDelivery;

#[async_trait]
impl PaymentFlow for CashOnDelivery {
    fn status_on_create(&self) -> OrderStatus {
        OrderStatus::CashOnDeliveryConfirmed
    }

    async fn initiate(
        &self,
        _gateway: &dyn PaymentGateway,
        _order: &Order,
    ) -> Result<Option<PaymentIntent>, GatewayError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_on_create() {
        assert_eq!(
            PaymentMethod::CreditCard.flow().status_on_create(),
            OrderStatus::PendingPayment
        );
        assert_eq!(
            PaymentMethod::CashOnDelivery.flow().status_on_create(),
            OrderStatus::CashOnDeliveryConfirmed
        );
    }

    #[test]
    fn test_method_wire_names() {
        let m: PaymentMethod = serde_json::from_str(r#""CASH_ON_DELIVERY""#).unwrap();
        assert_eq!(m, PaymentMethod::CashOnDelivery);
        assert_eq!(serde_json::to_string(&PaymentMethod::CreditCard).unwrap(), r#""CREDIT_CARD""#);
    }
}
