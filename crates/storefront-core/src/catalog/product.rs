//! Catalog entries as seen by the checkout core.

use crate::catalog::SellableUnit;
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Product status in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    /// Product is active and can be bought.
    #[default]
    Active,
    /// Temporarily not for sale.
    Unavailable,
    /// Archived, data preserved.
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Unavailable => "unavailable",
            ProductStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ProductStatus::Active),
            "unavailable" => Some(ProductStatus::Unavailable),
            "archived" => Some(ProductStatus::Archived),
            _ => None,
        }
    }
}

/// Current price and sellability of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub unit: SellableUnit,
    /// Display name (denormalized onto cart and order lines).
    pub name: String,
    /// Current catalog price.
    pub unit_price: Money,
    pub status: ProductStatus,
}

impl CatalogEntry {
    pub fn new(unit: SellableUnit, name: impl Into<String>, unit_price: Money) -> Self {
        Self {
            unit,
            name: name.into(),
            unit_price,
            status: ProductStatus::Active,
        }
    }

    /// Whether the unit can be added to a cart or ordered.
    pub fn is_sellable(&self) -> bool {
        self.status == ProductStatus::Active
    }
}
