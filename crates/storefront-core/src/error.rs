//! Commerce error types.

use crate::cart::CouponRejection;
use crate::checkout::CheckoutIssue;
use crate::ids::OrderId;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur in cart, checkout and order operations.
#[derive(Error, Debug)]
pub enum CommerceError {
    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Quantity is not a positive integer.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Quantity exceeds the per-line maximum.
    #[error("Quantity {0} exceeds maximum allowed ({1})")]
    QuantityExceedsLimit(i64, i64),

    /// Currency mismatch.
    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Arithmetic overflow.
    #[error("Arithmetic overflow in money calculation")]
    Overflow,

    /// One or more units cannot cover the requested quantity.
    #[error("Insufficient stock for {} line(s)", issues.len())]
    InsufficientStock { issues: Vec<CheckoutIssue> },

    /// Catalog prices moved since the lines were added; re-confirm to proceed.
    #[error("Prices changed for {} line(s)", issues.len())]
    PriceChanged { issues: Vec<CheckoutIssue> },

    /// Checkout validation found blocking issues.
    #[error("Checkout rejected with {} issue(s)", issues.len())]
    CheckoutRejected { issues: Vec<CheckoutIssue> },

    /// Coupon cannot be applied.
    #[error("Invalid coupon: {0}")]
    InvalidCoupon(CouponRejection),

    /// A concurrent writer won; the operation can be retried.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The operation needs an authenticated user.
    #[error("Authentication required")]
    AuthRequired,

    #[error("Cart line not found: {0}")]
    LineNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Shipping method not found: {0}")]
    ShippingMethodNotFound(String),

    /// Invalid order or checkout state transition.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The order exists but the payment gateway could not create an intent.
    #[error("Payment initiation failed for order {order_id}: {message}")]
    PaymentInitiation { order_id: OrderId, message: String },

    /// The gateway could not tell us where a payment intent stands.
    #[error("Payment verification failed: {0}")]
    PaymentVerification(String),

    /// Store failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Unexpected failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommerceError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            CommerceError::Validation(_)
            | CommerceError::InvalidQuantity(_)
            | CommerceError::QuantityExceedsLimit(..)
            | CommerceError::CurrencyMismatch { .. }
            | CommerceError::Overflow => "VALIDATION_ERROR",
            CommerceError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CommerceError::PriceChanged { .. } => "PRICE_CHANGED",
            CommerceError::CheckoutRejected { .. } => "CHECKOUT_REJECTED",
            CommerceError::InvalidCoupon(_) => "INVALID_COUPON",
            CommerceError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            CommerceError::AuthRequired => "AUTH_REQUIRED",
            CommerceError::LineNotFound(_)
            | CommerceError::ProductNotFound(_)
            | CommerceError::OrderNotFound(_)
            | CommerceError::AddressNotFound(_)
            | CommerceError::ShippingMethodNotFound(_) => "NOT_FOUND",
            CommerceError::InvalidTransition { .. } => "INVALID_STATE",
            CommerceError::PaymentInitiation { .. } => "PAYMENT_INITIATION_FAILED",
            CommerceError::PaymentVerification(_) => "PAYMENT_VERIFICATION_FAILED",
            CommerceError::Store(_) | CommerceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommerceError::ConcurrencyConflict(_)
                | CommerceError::PaymentInitiation { .. }
                | CommerceError::PaymentVerification(_)
        )
    }

    /// Per-line issues carried by stock, price and rejection errors.
    pub fn issues(&self) -> Option<&[CheckoutIssue]> {
        match self {
            CommerceError::InsufficientStock { issues }
            | CommerceError::PriceChanged { issues }
            | CommerceError::CheckoutRejected { issues } => Some(issues),
            _ => None,
        }
    }

    /// Whether the error is unexpected (logged in full, hidden from callers).
    pub fn is_internal(&self) -> bool {
        matches!(self, CommerceError::Store(_) | CommerceError::Internal(_))
    }
}

impl From<StoreError> for CommerceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Busy(msg) => CommerceError::ConcurrencyConflict(msg),
            other => CommerceError::Store(other),
        }
    }
}

impl From<serde_json::Error> for CommerceError {
    fn from(e: serde_json::Error) -> Self {
        CommerceError::Internal(format!("serialization: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_store_maps_to_conflict() {
        let err: CommerceError = StoreError::Busy("database is locked".into()).into();
        assert_eq!(err.code(), "CONCURRENCY_CONFLICT");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_internal_errors_are_flagged() {
        let err: CommerceError = StoreError::Query("syntax".into()).into();
        assert!(err.is_internal());
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_coupon_error_code() {
        let err = CommerceError::InvalidCoupon(CouponRejection::Expired);
        assert_eq!(err.code(), "INVALID_COUPON");
        assert_eq!(err.to_string(), "Invalid coupon: coupon has expired");
    }

    #[test]
    fn test_payment_verification_is_retryable() {
        let err = CommerceError::PaymentVerification("gateway down".into());
        assert_eq!(err.code(), "PAYMENT_VERIFICATION_FAILED");
        assert!(err.is_retryable());
        assert!(!err.is_internal());
    }
}
