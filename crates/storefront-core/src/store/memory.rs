//! In-memory backend.
//!
//! Transactions are serialized behind one async mutex and roll back by
//! restoring a snapshot taken at `begin`. Suitable for tests and local runs;
//! never hold two transactions from the same task at once.

use super::{Store, StoreError, Transaction};
use crate::cart::{Cart, Coupon, CouponCode, CouponRedemption};
use crate::catalog::{CatalogEntry, InventoryRecord, SellableUnit};
use crate::checkout::{Order, OrderStatus, SavedAddress};
use crate::identity::CartOwner;
use crate::ids::{AddressId, CartId, OrderId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    catalog: HashMap<SellableUnit, CatalogEntry>,
    inventory: HashMap<SellableUnit, InventoryRecord>,
    carts: HashMap<CartId, Cart>,
    coupons: HashMap<CouponCode, Coupon>,
    redemptions: Vec<CouponRedemption>,
    addresses: HashMap<AddressId, SavedAddress>,
    orders: HashMap<OrderId, Order>,
}

/// Process-local store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let undo = Some(guard.clone());
        Ok(Box::new(MemoryTx { guard, undo }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    /// Snapshot restored on drop unless the transaction committed.
    undo: Option<Tables>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            *self.guard = undo;
        }
    }
}

impl MemoryTx {
    fn inventory_mut(&mut self, unit: &SellableUnit) -> Result<&mut InventoryRecord, StoreError> {
        self.guard
            .inventory
            .get_mut(unit)
            .ok_or_else(|| StoreError::Query(format!("no inventory row for {}", unit)))
    }
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn inventory(
        &mut self,
        unit: &SellableUnit,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self.guard.inventory.get(unit).cloned())
    }

    async fn put_inventory(&mut self, record: &InventoryRecord) -> Result<(), StoreError> {
        if !record.is_consistent() {
            return Err(StoreError::Corrupt(format!(
                "reserved {} outside 0..={} for {}",
                record.reserved, record.quantity, record.unit
            )));
        }
        self.guard.inventory.insert(record.unit.clone(), record.clone());
        Ok(())
    }

    async fn reserve_if_available(
        &mut self,
        unit: &SellableUnit,
        qty: i64,
    ) -> Result<bool, StoreError> {
        Ok(match self.guard.inventory.get_mut(unit) {
            Some(record) => record.try_reserve(qty),
            None => false,
        })
    }

    async fn release_reserved(&mut self, unit: &SellableUnit, qty: i64) -> Result<(), StoreError> {
        self.inventory_mut(unit)?.release(qty);
        Ok(())
    }

    async fn commit_reserved(&mut self, unit: &SellableUnit, qty: i64) -> Result<(), StoreError> {
        self.inventory_mut(unit)?.commit(qty);
        Ok(())
    }

    async fn catalog_entry(
        &mut self,
        unit: &SellableUnit,
    ) -> Result<Option<CatalogEntry>, StoreError> {
        Ok(self.guard.catalog.get(unit).cloned())
    }

    async fn put_catalog_entry(&mut self, entry: &CatalogEntry) -> Result<(), StoreError> {
        self.guard.catalog.insert(entry.unit.clone(), entry.clone());
        Ok(())
    }

    async fn cart(&mut self, id: &CartId) -> Result<Option<Cart>, StoreError> {
        Ok(self.guard.carts.get(id).cloned())
    }

    async fn cart_for_owner(&mut self, owner: &CartOwner) -> Result<Option<Cart>, StoreError> {
        Ok(self
            .guard
            .carts
            .values()
            .find(|c| &c.owner == owner)
            .cloned())
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<(), StoreError> {
        let clash = self
            .guard
            .carts
            .values()
            .any(|c| c.owner == cart.owner && c.id != cart.id);
        if clash {
            return Err(StoreError::Query(format!(
                "owner of cart {} already has a cart",
                cart.id
            )));
        }
        self.guard.carts.insert(cart.id.clone(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&mut self, id: &CartId) -> Result<bool, StoreError> {
        Ok(self.guard.carts.remove(id).is_some())
    }

    async fn delete_anonymous_carts_inactive_since(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let before = self.guard.carts.len();
        self.guard
            .carts
            .retain(|_, c| !(c.owner.is_anonymous() && c.last_activity_at < cutoff));
        Ok((before - self.guard.carts.len()) as u64)
    }

    async fn coupon(&mut self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
        Ok(self.guard.coupons.get(code).cloned())
    }

    async fn put_coupon(&mut self, coupon: &Coupon) -> Result<(), StoreError> {
        self.guard.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn increment_coupon_usage(&mut self, code: &CouponCode) -> Result<bool, StoreError> {
        Ok(match self.guard.coupons.get_mut(code) {
            Some(coupon) if coupon.has_uses_left() => {
                coupon.used_count += 1;
                true
            }
            _ => false,
        })
    }

    async fn record_redemption(&mut self, redemption: &CouponRedemption) -> Result<(), StoreError> {
        self.guard.redemptions.push(redemption.clone());
        Ok(())
    }

    async fn redemption_count(
        &mut self,
        code: &CouponCode,
        user_id: &UserId,
    ) -> Result<i64, StoreError> {
        Ok(self
            .guard
            .redemptions
            .iter()
            .filter(|r| &r.code == code && &r.user_id == user_id)
            .count() as i64)
    }

    async fn address(&mut self, id: &AddressId) -> Result<Option<SavedAddress>, StoreError> {
        Ok(self.guard.addresses.get(id).cloned())
    }

    async fn put_address(&mut self, address: &SavedAddress) -> Result<(), StoreError> {
        self.guard.addresses.insert(address.id.clone(), address.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.guard.orders.contains_key(&order.id) {
            return Err(StoreError::Query(format!("order {} already exists", order.id)));
        }
        self.guard.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn order(&mut self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.guard.orders.get(id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        match self.guard.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(StoreError::Query(format!("order {} does not exist", order.id))),
        }
    }

    async fn orders_with_status_before(
        &mut self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderId>, StoreError> {
        let mut matching: Vec<_> = self
            .guard
            .orders
            .values()
            .filter(|o| o.status == status && o.created_at < cutoff)
            .map(|o| (o.created_at, o.id.clone()))
            .collect();
        matching.sort();
        Ok(matching.into_iter().map(|(_, id)| id).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = self;
        tx.undo = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, Money};

    fn unit() -> SellableUnit {
        SellableUnit::product("mug")
    }

    async fn seeded(quantity: i64) -> MemoryStore {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.put_inventory(&InventoryRecord::new(unit(), quantity))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let store = seeded(5).await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.reserve_if_available(&unit(), 2).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.inventory(&unit()).await.unwrap().unwrap().reserved, 2);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = seeded(5).await;
        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.reserve_if_available(&unit(), 3).await.unwrap());
            tx.put_catalog_entry(&CatalogEntry::new(
                unit(),
                "Mug",
                Money::new(1_000, Currency::USD),
            ))
            .await
            .unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.inventory(&unit()).await.unwrap().unwrap().reserved, 0);
        assert!(tx.catalog_entry(&unit()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reserve_is_conditional() {
        let store = seeded(3).await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.reserve_if_available(&unit(), 3).await.unwrap());
        assert!(!tx.reserve_if_available(&unit(), 1).await.unwrap());
        assert!(!tx
            .reserve_if_available(&SellableUnit::product("missing"), 1)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_put_inventory_rejects_inconsistent_record() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut record = InventoryRecord::new(unit(), 1);
        record.reserved = 2;
        assert!(matches!(
            tx.put_inventory(&record).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_coupon_usage_increment_respects_limit() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut coupon = Coupon::percentage("ONCE", 10);
        coupon.usage_limit = Some(1);
        tx.put_coupon(&coupon).await.unwrap();

        let code = CouponCode::new("once");
        assert!(tx.increment_coupon_usage(&code).await.unwrap());
        assert!(!tx.increment_coupon_usage(&code).await.unwrap());
        assert_eq!(tx.coupon(&code).await.unwrap().unwrap().used_count, 1);
    }
}
