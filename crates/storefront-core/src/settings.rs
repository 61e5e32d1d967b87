//! Runtime settings the services need.

use crate::checkout::ShippingMethod;
use crate::ids::ShippingMethodId;
use crate::money::Currency;
use chrono::Duration;

/// Default days an idle anonymous cart is kept.
pub const DEFAULT_ANONYMOUS_RETENTION_DAYS: i64 = 30;

/// Default minutes a card order may wait for payment before it is cancelled.
pub const DEFAULT_PENDING_PAYMENT_TIMEOUT_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct StorefrontSettings {
    /// Currency of every cart and order.
    pub currency: Currency,
    pub anonymous_retention: Duration,
    pub pending_payment_timeout: Duration,
    /// Flat tax on the discounted subtotal, in basis points.
    pub tax_rate_bps: i64,
    pub shipping_methods: Vec<ShippingMethod>,
}

impl Default for StorefrontSettings {
    fn default() -> Self {
        Self {
            currency: Currency::USD,
            anonymous_retention: Duration::days(DEFAULT_ANONYMOUS_RETENTION_DAYS),
            pending_payment_timeout: Duration::minutes(DEFAULT_PENDING_PAYMENT_TIMEOUT_MINUTES),
            tax_rate_bps: 0,
            shipping_methods: Vec::new(),
        }
    }
}

impl StorefrontSettings {
    pub fn shipping_method(&self, id: &ShippingMethodId) -> Option<&ShippingMethod> {
        self.shipping_methods.iter().find(|m| &m.id == id)
    }
}
