use crate::catalog::{CatalogEntry, SellableUnit};
use crate::error::CommerceError;
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of truth for current price and sellability.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn entry(&self, unit: &SellableUnit) -> Result<Option<CatalogEntry>, CommerceError>;
}

/// Catalog read from the store's own catalog table.
#[derive(Clone)]
pub struct StoreCatalog {
    store: Arc<dyn Store>,
}

impl StoreCatalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Catalog for StoreCatalog {
    async fn entry(&self, unit: &SellableUnit) -> Result<Option<CatalogEntry>, CommerceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.catalog_entry(unit).await?)
    }
}
