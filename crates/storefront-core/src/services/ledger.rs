//! Inventory ledger.
//!
//! The only component that touches `quantity` and `reserved`. Each operation
//! either runs in its own transaction or joins the caller's (`*_in`).

use crate::catalog::{InventoryRecord, SellableUnit};
use crate::checkout::CheckoutIssue;
use crate::error::CommerceError;
use crate::store::{Store, Transaction};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn Store>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Unreserved quantity; zero for units with no inventory row.
    pub async fn available(&self, unit: &SellableUnit) -> Result<i64, CommerceError> {
        let mut tx = self.store.begin().await?;
        Self::available_in(tx.as_mut(), unit).await
    }

    pub async fn available_in(
        tx: &mut dyn Transaction,
        unit: &SellableUnit,
    ) -> Result<i64, CommerceError> {
        Ok(tx
            .inventory(unit)
            .await?
            .map(|r| r.available())
            .unwrap_or(0))
    }

    /// Reserve `qty` of `unit` in a transaction of its own.
    pub async fn reserve(&self, unit: &SellableUnit, qty: i64) -> Result<(), CommerceError> {
        let mut tx = self.store.begin().await?;
        Self::reserve_in(tx.as_mut(), unit, qty).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Take a hold with a single conditional update.
    ///
    /// Fails with `InsufficientStock` and no mutation when the hold does not fit.
    pub async fn reserve_in(
        tx: &mut dyn Transaction,
        unit: &SellableUnit,
        qty: i64,
    ) -> Result<(), CommerceError> {
        if qty <= 0 {
            return Err(CommerceError::InvalidQuantity(qty));
        }
        if tx.reserve_if_available(unit, qty).await? {
            debug!(unit = %unit, qty, "Reserved");
            return Ok(());
        }
        let available = Self::available_in(tx, unit).await?;
        Err(CommerceError::InsufficientStock {
            issues: vec![CheckoutIssue::InsufficientStock {
                unit: unit.clone(),
                requested: qty,
                available,
            }],
        })
    }

    pub async fn release(&self, unit: &SellableUnit, qty: i64) -> Result<(), CommerceError> {
        let mut tx = self.store.begin().await?;
        Self::release_in(tx.as_mut(), unit, qty).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Give back a hold. The ledger does not deduplicate; callers track releases.
    pub async fn release_in(
        tx: &mut dyn Transaction,
        unit: &SellableUnit,
        qty: i64,
    ) -> Result<(), CommerceError> {
        if qty <= 0 {
            return Err(CommerceError::InvalidQuantity(qty));
        }
        tx.release_reserved(unit, qty).await?;
        debug!(unit = %unit, qty, "Released");
        Ok(())
    }

    pub async fn commit(&self, unit: &SellableUnit, qty: i64) -> Result<(), CommerceError> {
        let mut tx = self.store.begin().await?;
        Self::commit_in(tx.as_mut(), unit, qty).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Turn a hold into a permanent deduction.
    pub async fn commit_in(
        tx: &mut dyn Transaction,
        unit: &SellableUnit,
        qty: i64,
    ) -> Result<(), CommerceError> {
        if qty <= 0 {
            return Err(CommerceError::InvalidQuantity(qty));
        }
        tx.commit_reserved(unit, qty).await?;
        debug!(unit = %unit, qty, "Committed");
        Ok(())
    }

    /// Set on-hand quantity, keeping existing holds.
    pub async fn set_stock(
        &self,
        unit: &SellableUnit,
        quantity: i64,
    ) -> Result<InventoryRecord, CommerceError> {
        if quantity < 0 {
            return Err(CommerceError::InvalidQuantity(quantity));
        }
        let mut tx = self.store.begin().await?;
        let record = match tx.inventory(unit).await? {
            Some(mut existing) => {
                if quantity < existing.reserved {
                    warn!(
                        unit = %unit,
                        quantity,
                        reserved = existing.reserved,
                        "Stock set below reserved; clamping"
                    );
                }
                existing.set_quantity(quantity);
                existing
            }
            None => InventoryRecord::new(unit.clone(), quantity),
        };
        tx.put_inventory(&record).await?;
        tx.commit().await?;
        Ok(record)
    }

    pub async fn record(
        &self,
        unit: &SellableUnit,
    ) -> Result<Option<InventoryRecord>, CommerceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.inventory(unit).await?)
    }
}
