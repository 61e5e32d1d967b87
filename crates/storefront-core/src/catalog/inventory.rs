//! Inventory record for a sellable unit.

use crate::catalog::SellableUnit;
use serde::{Deserialize, Serialize};

/// On-hand and reserved quantity for one sellable unit.
///
/// Invariant: `0 <= reserved <= quantity`. Every mutation below preserves it;
/// backends apply the same rules as single conditional updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub unit: SellableUnit,
    /// Quantity on hand.
    pub quantity: i64,
    /// Quantity soft-held by in-flight orders.
    pub reserved: i64,
}

impl InventoryRecord {
    /// Create a record with nothing reserved.
    pub fn new(unit: SellableUnit, quantity: i64) -> Self {
        Self {
            unit,
            quantity: quantity.max(0),
            reserved: 0,
        }
    }

    /// Quantity that can still be reserved.
    pub fn available(&self) -> i64 {
        (self.quantity - self.reserved).max(0)
    }

    /// Reserve `qty` if it fits; leaves the record untouched otherwise.
    pub fn try_reserve(&mut self, qty: i64) -> bool {
        if qty <= 0 || self.reserved + qty > self.quantity {
            return false;
        }
        self.reserved += qty;
        true
    }

    /// Release a hold, floored at zero.
    pub fn release(&mut self, qty: i64) {
        self.reserved = (self.reserved - qty).max(0);
    }

    /// Turn a hold into a permanent deduction.
    pub fn commit(&mut self, qty: i64) {
        self.quantity = (self.quantity - qty).max(0);
        self.reserved = (self.reserved - qty).max(0).min(self.quantity);
    }

    /// Set on-hand quantity (restock or correction), keeping existing holds.
    pub fn set_quantity(&mut self, quantity: i64) {
        self.quantity = quantity.max(self.reserved).max(0);
    }

    pub fn is_consistent(&self) -> bool {
        0 <= self.reserved && self.reserved <= self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quantity: i64) -> InventoryRecord {
        InventoryRecord::new(SellableUnit::product("mug"), quantity)
    }

    #[test]
    fn test_inventory_reserve_release() {
        let mut inv = record(10);

        assert!(inv.try_reserve(3));
        assert_eq!(inv.reserved, 3);
        assert_eq!(inv.available(), 7);

        inv.release(2);
        assert_eq!(inv.reserved, 1);
        assert_eq!(inv.available(), 9);
    }

    #[test]
    fn test_reserve_beyond_quantity_leaves_record_untouched() {
        let mut inv = record(5);
        assert!(inv.try_reserve(4));
        assert!(!inv.try_reserve(2));
        assert_eq!(inv.reserved, 4);
        assert!(inv.is_consistent());
    }

    #[test]
    fn test_reserve_rejects_non_positive() {
        let mut inv = record(5);
        assert!(!inv.try_reserve(0));
        assert!(!inv.try_reserve(-1));
        assert_eq!(inv.reserved, 0);
    }

    #[test]
    fn test_release_floors_at_zero() {
        let mut inv = record(5);
        inv.try_reserve(2);
        inv.release(5);
        assert_eq!(inv.reserved, 0);
    }

    #[test]
    fn test_inventory_commit() {
        let mut inv = record(10);
        inv.try_reserve(3);
        inv.commit(3);

        assert_eq!(inv.quantity, 7);
        assert_eq!(inv.reserved, 0);
    }

    #[test]
    fn test_set_quantity_never_drops_below_reserved() {
        let mut inv = record(10);
        inv.try_reserve(6);
        inv.set_quantity(2);
        assert_eq!(inv.quantity, 6);
        assert!(inv.is_consistent());
    }
}
