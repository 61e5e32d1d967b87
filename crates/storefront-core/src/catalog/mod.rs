//! Catalog-facing types.
//!
//! Contains sellable units, inventory records and catalog entries.

mod inventory;
mod product;
mod unit;

pub use inventory::InventoryRecord;
pub use product::{CatalogEntry, ProductStatus};
pub use unit::SellableUnit;
