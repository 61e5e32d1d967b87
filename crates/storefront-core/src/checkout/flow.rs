//! Checkout attempt state machine.

use crate::checkout::OrderStatus;
use crate::error::CommerceError;
use serde::{Deserialize, Serialize};

/// Stages of one checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStage {
    /// Checking lines against catalog and stock.
    Validating,
    /// Taking inventory holds.
    Reserving,
    /// Order row written with its reservation.
    OrderCreated,
    /// Card order waiting for the gateway.
    AwaitingPayment,
    /// Order placed without a payment step.
    Placed,
    /// Attempt failed before an order existed.
    Rejected,
    /// Order cancelled later and its hold released.
    ReservationReleased,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::Validating => "validating",
            CheckoutStage::Reserving => "reserving",
            CheckoutStage::OrderCreated => "order_created",
            CheckoutStage::AwaitingPayment => "awaiting_payment",
            CheckoutStage::Placed => "placed",
            CheckoutStage::Rejected => "rejected",
            CheckoutStage::ReservationReleased => "reservation_released",
        }
    }

    pub fn can_advance_to(&self, next: CheckoutStage) -> bool {
        use CheckoutStage::*;
        matches!(
            (self, next),
            (Validating, Reserving)
                | (Validating, Rejected)
                | (Reserving, OrderCreated)
                | (Reserving, Rejected)
                | (OrderCreated, AwaitingPayment)
                | (OrderCreated, Placed)
                | (OrderCreated, ReservationReleased)
                | (AwaitingPayment, ReservationReleased)
                | (Placed, ReservationReleased)
        )
    }

    /// Advance to the next stage.
    pub fn advance(self, next: CheckoutStage) -> Result<CheckoutStage, CommerceError> {
        if !self.can_advance_to(next) {
            return Err(CommerceError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        Ok(next)
    }

    /// Where a checkout left an order that is still live.
    pub fn after_checkout(status: OrderStatus) -> Option<CheckoutStage> {
        match status {
            OrderStatus::PendingPayment => Some(CheckoutStage::AwaitingPayment),
            OrderStatus::Paid | OrderStatus::CashOnDeliveryConfirmed => Some(CheckoutStage::Placed),
            OrderStatus::Fulfilled | OrderStatus::Cancelled => None,
        }
    }
}
