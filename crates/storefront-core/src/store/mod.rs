//! Persistence ports.
//!
//! All durable state lives behind [`Store`]. Every operation runs inside a
//! [`Transaction`]; dropping a transaction without calling
//! [`Transaction::commit`] rolls it back.

mod memory;

pub use memory::MemoryStore;

use crate::cart::{Cart, Coupon, CouponCode, CouponRedemption};
use crate::catalog::{CatalogEntry, InventoryRecord, SellableUnit};
use crate::checkout::{Order, OrderStatus, SavedAddress};
use crate::identity::CartOwner;
use crate::ids::{AddressId, CartId, OrderId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by store backends.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Failed to open or connect to the store.
    #[error("Failed to open store: {0}")]
    Open(String),

    /// Failed to execute a query.
    #[error("Query execution failed: {0}")]
    Query(String),

    /// Failed to encode or decode a stored document.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Lock contention; the transaction can be retried.
    #[error("Store busy: {0}")]
    Busy(String),

    /// Stored data violates an invariant.
    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Entry point to a backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

/// One atomic unit of work.
///
/// Inventory mutations are conditional updates evaluated against the current
/// row; no method reads a value for the caller to write back later.
#[async_trait]
pub trait Transaction: Send {
    // Inventory

    async fn inventory(
        &mut self,
        unit: &SellableUnit,
    ) -> Result<Option<InventoryRecord>, StoreError>;

    /// Insert or replace a record.
    async fn put_inventory(&mut self, record: &InventoryRecord) -> Result<(), StoreError>;

    /// Add `qty` to `reserved` only if `reserved + qty <= quantity`.
    /// Returns whether the hold was taken.
    async fn reserve_if_available(
        &mut self,
        unit: &SellableUnit,
        qty: i64,
    ) -> Result<bool, StoreError>;

    /// Subtract `qty` from `reserved`, floored at zero.
    async fn release_reserved(&mut self, unit: &SellableUnit, qty: i64) -> Result<(), StoreError>;

    /// Subtract `qty` from both `quantity` and `reserved`.
    async fn commit_reserved(&mut self, unit: &SellableUnit, qty: i64) -> Result<(), StoreError>;

    // Catalog

    async fn catalog_entry(
        &mut self,
        unit: &SellableUnit,
    ) -> Result<Option<CatalogEntry>, StoreError>;

    async fn put_catalog_entry(&mut self, entry: &CatalogEntry) -> Result<(), StoreError>;

    // Carts

    async fn cart(&mut self, id: &CartId) -> Result<Option<Cart>, StoreError>;

    async fn cart_for_owner(&mut self, owner: &CartOwner) -> Result<Option<Cart>, StoreError>;

    /// Insert or replace a cart together with all of its lines.
    async fn save_cart(&mut self, cart: &Cart) -> Result<(), StoreError>;

    async fn delete_cart(&mut self, id: &CartId) -> Result<bool, StoreError>;

    /// Delete anonymous carts last active before `cutoff`. Returns the count deleted.
    async fn delete_anonymous_carts_inactive_since(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // Coupons

    async fn coupon(&mut self, code: &CouponCode) -> Result<Option<Coupon>, StoreError>;

    async fn put_coupon(&mut self, coupon: &Coupon) -> Result<(), StoreError>;

    /// Increment `used_count` only while it is below `usage_limit`.
    /// Returns whether the increment happened.
    async fn increment_coupon_usage(&mut self, code: &CouponCode) -> Result<bool, StoreError>;

    async fn record_redemption(&mut self, redemption: &CouponRedemption) -> Result<(), StoreError>;

    async fn redemption_count(
        &mut self,
        code: &CouponCode,
        user_id: &UserId,
    ) -> Result<i64, StoreError>;

    // Addresses

    async fn address(&mut self, id: &AddressId) -> Result<Option<SavedAddress>, StoreError>;

    async fn put_address(&mut self, address: &SavedAddress) -> Result<(), StoreError>;

    // Orders

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn order(&mut self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Orders in `status` created before `cutoff`, oldest first.
    async fn orders_with_status_before(
        &mut self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderId>, StoreError>;

    /// Make every change in this transaction durable.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
