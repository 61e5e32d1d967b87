//! Orders and the order state machine.

use crate::cart::CouponCode;
use crate::catalog::SellableUnit;
use crate::checkout::{Address, PaymentMethod, ShippingSelection};
use crate::error::CommerceError;
use crate::ids::{OrderId, PaymentIntentId, UserId};
use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, waiting for the gateway to confirm payment.
    #[default]
    PendingPayment,
    /// Gateway confirmed payment.
    Paid,
    /// Cash on delivery; placed without a payment step.
    CashOnDeliveryConfirmed,
    /// Shipped; the reservation became a permanent deduction.
    Fulfilled,
    /// Cancelled; the reservation was released.
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::CashOnDeliveryConfirmed => "CASH_ON_DELIVERY_CONFIRMED",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING_PAYMENT" => Some(OrderStatus::PendingPayment),
            "PAID" => Some(OrderStatus::Paid),
            "CASH_ON_DELIVERY_CONFIRMED" => Some(OrderStatus::CashOnDeliveryConfirmed),
            "FULFILLED" => Some(OrderStatus::Fulfilled),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Check if order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Fulfilled | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (PendingPayment, Paid)
                | (PendingPayment, CashOnDeliveryConfirmed)
                | (PendingPayment, Cancelled)
                | (Paid, Fulfilled)
                | (CashOnDeliveryConfirmed, Fulfilled)
                | (CashOnDeliveryConfirmed, Cancelled)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the order's inventory hold stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    #[default]
    Held,
    Released,
    Committed,
}

/// The quantity this order added to a unit's `reserved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationHold {
    pub unit: SellableUnit,
    pub quantity: i64,
}

/// An order line, frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub unit: SellableUnit,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// This line's share of the order discount.
    pub discount_share: Money,
    /// `unit_price * quantity`, before discount.
    pub line_total: Money,
}

/// Money totals of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount_total: Money,
    pub shipping_total: Money,
    pub tax_total: Money,
    /// `subtotal - discount + shipping + tax`.
    pub grand_total: Money,
}

impl OrderTotals {
    /// Tax is a flat rate on the discounted subtotal, rounded half-up once.
    pub fn compute(
        subtotal: Money,
        discount: Money,
        shipping: Money,
        tax_rate_bps: i64,
    ) -> Result<Self, CommerceError> {
        let taxable = subtotal.try_subtract(&discount)?.floor_zero();
        let tax_total = taxable.percentage_bps(tax_rate_bps)?;
        let grand_total = taxable.try_add(&shipping)?.try_add(&tax_total)?;
        Ok(Self {
            subtotal,
            discount_total: discount,
            shipping_total: shipping,
            tax_total,
            grand_total,
        })
    }
}

/// Split `discount` across line totals in proportion to each line.
///
/// Uses the largest-remainder method so the shares sum exactly to the discount.
pub fn allocate_discount(
    line_totals: &[Money],
    discount: Money,
) -> Result<Vec<Money>, CommerceError> {
    let currency = discount.currency;
    let subtotal: i128 = line_totals.iter().map(|m| i128::from(m.amount_cents)).sum();
    if subtotal <= 0 || discount.amount_cents <= 0 {
        return Ok(line_totals.iter().map(|_| Money::zero(currency)).collect());
    }

    let total = i128::from(discount.amount_cents);
    let mut shares = Vec::with_capacity(line_totals.len());
    let mut remainders = Vec::with_capacity(line_totals.len());
    for (index, line) in line_totals.iter().enumerate() {
        let scaled = total * i128::from(line.amount_cents);
        shares.push(scaled / subtotal);
        remainders.push((scaled % subtotal, index));
    }

    let mut leftover = total - shares.iter().sum::<i128>();
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, index) in remainders {
        if leftover == 0 {
            break;
        }
        shares[index] += 1;
        leftover -= 1;
    }

    shares
        .into_iter()
        .map(|cents| {
            i64::try_from(cents)
                .map(|c| Money::new(c, currency))
                .map_err(|_| CommerceError::Overflow)
        })
        .collect()
}

/// A placed order. Lines and totals never change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    /// Human-readable order number.
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    /// Inventory held on behalf of this order.
    pub reservations: Vec<ReservationHold>,
    pub reservation_state: ReservationState,
    pub shipping_address: Address,
    pub shipping: ShippingSelection,
    pub payment_method: PaymentMethod,
    pub payment_intent_id: Option<PaymentIntentId>,
    pub coupon_code: Option<CouponCode>,
    pub currency: Currency,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl Order {
    /// Order number of the form `ORD-20250101-1A2B3C4D`.
    pub fn generate_order_number(id: &OrderId, now: DateTime<Utc>) -> String {
        let suffix: String = id
            .as_str()
            .chars()
            .rev()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("ORD-{}-{}", now.format("%Y%m%d"), suffix.to_uppercase())
    }

    /// Get total item count.
    pub fn item_count(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Move to `to`, enforcing the order state machine.
    pub fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), CommerceError> {
        if !self.status.can_transition_to(to) {
            return Err(CommerceError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Cancel the order; the caller releases `reservations` in the same transaction.
    pub fn cancel(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), CommerceError> {
        self.transition(OrderStatus::Cancelled, now)?;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason.into());
        if self.reservation_state == ReservationState::Held {
            self.reservation_state = ReservationState::Released;
        }
        Ok(())
    }

    pub fn holds_reservation(&self) -> bool {
        self.reservation_state == ReservationState::Held
    }
}
