//! Per-line problems found while validating a checkout.

use crate::catalog::SellableUnit;
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// A problem with one cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutIssue {
    /// Not enough unreserved stock to cover the line.
    InsufficientStock {
        unit: SellableUnit,
        requested: i64,
        available: i64,
    },
    /// Catalog price differs from the price captured on the line.
    PriceChanged {
        unit: SellableUnit,
        old_price: Money,
        new_price: Money,
    },
    /// Unit is archived, unavailable or gone from the catalog.
    Unavailable { unit: SellableUnit },
}

impl CheckoutIssue {
    pub fn unit(&self) -> &SellableUnit {
        match self {
            CheckoutIssue::InsufficientStock { unit, .. }
            | CheckoutIssue::PriceChanged { unit, .. }
            | CheckoutIssue::Unavailable { unit } => unit,
        }
    }

    /// Price drift can be re-confirmed; everything else stops the checkout.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, CheckoutIssue::PriceChanged { .. })
    }
}
