//! SQLite backend for the storefront.
//!
//! Implements [`storefront_core::store::Store`] on top of an `sqlx` pool.
//! Inventory holds and coupon usage are single conditional `UPDATE`
//! statements, so the row itself is the arbiter under contention.
//!
//! # Example
//!
//! ```rust,ignore
//! use storefront_db::SqliteStore;
//!
//! let store = SqliteStore::open("storefront.db", 1).await?;
//! let mut tx = store.begin().await?;
//! let taken = tx.reserve_if_available(&unit, 2).await?;
//! tx.commit().await?;
//! ```

mod error;
mod schema;
mod store;

pub use schema::SCHEMA;
pub use store::SqliteStore;
