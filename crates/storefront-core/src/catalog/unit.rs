//! Sellable unit identity.

use crate::ids::{ProductId, VariantId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A product, optionally scoped by a variant. Inventory is tracked per unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SellableUnit {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
}

impl SellableUnit {
    /// A unit for a product without variants.
    pub fn product(product_id: impl Into<ProductId>) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
        }
    }

    /// A unit for a specific product variant.
    pub fn variant(product_id: impl Into<ProductId>, variant_id: impl Into<VariantId>) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: Some(variant_id.into()),
        }
    }

    /// Variant id as stored in keyed tables, where "no variant" is the empty string.
    pub fn variant_key(&self) -> &str {
        self.variant_id.as_ref().map(|v| v.as_str()).unwrap_or("")
    }

    /// Rebuild a unit from its keyed-table representation.
    pub fn from_keys(product_id: impl Into<ProductId>, variant_key: &str) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: (!variant_key.is_empty()).then(|| VariantId::new(variant_key)),
        }
    }
}

impl fmt::Display for SellableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_id {
            Some(variant) => write!(f, "{}/{}", self.product_id, variant),
            None => write!(f, "{}", self.product_id),
        }
    }
}
