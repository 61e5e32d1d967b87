//! Shipping methods and the selection snapshotted onto an order.

use crate::ids::ShippingMethodId;
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// A shipping method option.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingMethod {
    pub id: ShippingMethodId,
    /// Display name.
    pub name: String,
    /// Shipping price.
    pub price: Money,
    /// Whether a free-shipping coupon waives this method's price.
    pub free_shipping_eligible: bool,
}

impl ShippingMethod {
    pub fn new(id: impl Into<ShippingMethodId>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            free_shipping_eligible: true,
        }
    }

    /// Price this method for an order, applying a free-shipping waiver if eligible.
    pub fn quote(&self, free_shipping: bool) -> ShippingSelection {
        let waived = free_shipping && self.free_shipping_eligible && !self.price.is_zero();
        ShippingSelection {
            method_id: self.id.clone(),
            method_name: self.name.clone(),
            rate: if waived {
                Money::zero(self.price.currency)
            } else {
                self.price
            },
            waived,
        }
    }
}

/// A selected shipping method with its charged rate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingSelection {
    pub method_id: ShippingMethodId,
    /// Method name (denormalized).
    pub method_name: String,
    /// Charged rate.
    pub rate: Money,
    /// The rate was waived by a coupon.
    pub waived: bool,
}
