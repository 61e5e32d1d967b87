//! Shipping addresses.

use crate::ids::{AddressId, UserId};
use serde::{Deserialize, Serialize};

/// A postal address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Address {
    /// Recipient full name.
    pub recipient: String,
    /// Address line 1.
    pub line1: String,
    /// Address line 2 (apt, suite, etc.).
    pub line2: Option<String>,
    pub city: String,
    /// State/province code (e.g., "CA").
    pub region: Option<String>,
    /// Postal/ZIP code.
    pub postal_code: String,
    /// Country code (e.g., "US").
    pub country_code: String,
    pub phone: Option<String>,
}

impl Address {
    pub fn new(
        recipient: impl Into<String>,
        line1: impl Into<String>,
        city: impl Into<String>,
        postal_code: impl Into<String>,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            line1: line1.into(),
            city: city.into(),
            postal_code: postal_code.into(),
            country_code: country_code.into(),
            ..Self::default()
        }
    }

    /// Required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let required = [
            ("recipient", &self.recipient),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country_code", &self.country_code),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Format as single line.
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.line1.clone()];
        if let Some(ref line2) = self.line2 {
            parts.push(line2.clone());
        }
        parts.push(self.city.clone());
        if let Some(ref region) = self.region {
            parts.push(region.clone());
        }
        parts.push(self.postal_code.clone());
        parts.push(self.country_code.clone());
        parts.join(", ")
    }
}

/// An address saved to a customer's account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedAddress {
    pub id: AddressId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub address: Address,
}

impl SavedAddress {
    pub fn new(user_id: UserId, address: Address) -> Self {
        Self {
            id: AddressId::generate(),
            user_id,
            address,
        }
    }
}
