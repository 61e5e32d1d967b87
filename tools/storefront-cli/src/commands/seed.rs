//! Load a fixture of products, stock, coupons and saved addresses.
//!
//! ```toml
//! [[products]]
//! product_id = "mug"
//! name = "Enamel Mug"
//! price_cents = 1200
//! stock = 40
//!
//! [[coupons]]
//! code = "SAVE10"
//! type = "percentage"
//! basis_points = 1000
//!
//! [[addresses]]
//! id = "addr_home"
//! user_id = "user_1"
//! recipient = "Ada Lovelace"
//! line1 = "12 Analytical St"
//! city = "London"
//! postal_code = "N1 7GU"
//! country_code = "GB"
//! ```

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use storefront_core::cart::Coupon;
use storefront_core::catalog::{CatalogEntry, ProductStatus, SellableUnit};
use storefront_core::checkout::{Address, SavedAddress};
use storefront_core::ids::{AddressId, ProductId, UserId, VariantId};
use storefront_core::money::Money;
use storefront_core::services::Storefront;

use super::SeedArgs;
use crate::config::{is_json_path, StoreBackend};
use crate::context::Context;
use crate::output::Output;

#[derive(Debug, Default, Deserialize)]
pub struct SeedFixture {
    #[serde(default)]
    pub products: Vec<ProductFixture>,
    #[serde(default)]
    pub coupons: Vec<Coupon>,
    #[serde(default)]
    pub addresses: Vec<AddressFixture>,
}

/// A catalog entry with its on-hand stock. Prices are in the configured currency.
#[derive(Debug, Deserialize)]
pub struct ProductFixture {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub price_cents: i64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub status: ProductStatus,
}

#[derive(Debug, Deserialize)]
pub struct AddressFixture {
    /// Fixed id so checkout requests can reference it; generated when absent.
    #[serde(default)]
    pub id: Option<AddressId>,
    pub user_id: UserId,
    #[serde(flatten)]
    pub address: Address,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SeedSummary {
    pub products: usize,
    pub coupons: usize,
    pub addresses: usize,
}

impl SeedFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        if is_json_path(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON fixture: {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML fixture: {}", path.display()))
        }
    }
}

/// Run the seed command.
pub async fn run(args: SeedArgs, ctx: &Context) -> Result<()> {
    let path = ctx.resolve_path(&args.fixture);
    let fixture = SeedFixture::load(&path)?;

    if ctx.config.store.backend == StoreBackend::Memory {
        ctx.output
            .warn("Seeding the in-memory store; nothing survives this process");
    }

    let storefront = ctx.storefront().await?;
    let summary = seed(&storefront, &fixture, &ctx.output).await?;

    if ctx.output.is_json() {
        ctx.output.json(&summary);
    } else {
        ctx.output.success(&format!("Seeded {}", path.display()));
        ctx.output.kv("products", &summary.products.to_string());
        ctx.output.kv("coupons", &summary.coupons.to_string());
        ctx.output.kv("addresses", &summary.addresses.to_string());
    }
    Ok(())
}

/// Write the fixture. Re-seeding updates entries in place and keeps existing reservations.
pub async fn seed(
    storefront: &Storefront,
    fixture: &SeedFixture,
    output: &Output,
) -> Result<SeedSummary> {
    let currency = storefront.settings.currency;
    let pb = output.progress(fixture.products.len() as u64, "products");

    for product in &fixture.products {
        let unit = SellableUnit {
            product_id: product.product_id.clone(),
            variant_id: product.variant_id.clone(),
        };
        let mut entry = CatalogEntry::new(
            unit.clone(),
            product.name.as_str(),
            Money::new(product.price_cents, currency),
        );
        entry.status = product.status;

        let mut tx = storefront.store.begin().await?;
        tx.put_catalog_entry(&entry).await?;
        tx.commit().await?;
        storefront
            .ledger
            .set_stock(&unit, product.stock)
            .await
            .with_context(|| format!("Failed to stock {}", unit))?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut tx = storefront.store.begin().await?;
    for coupon in &fixture.coupons {
        tx.put_coupon(coupon).await?;
    }
    for fixture_address in &fixture.addresses {
        let mut saved = SavedAddress::new(
            fixture_address.user_id.clone(),
            fixture_address.address.clone(),
        );
        if let Some(id) = &fixture_address.id {
            saved.id = id.clone();
        }
        tx.put_address(&saved).await?;
    }
    tx.commit().await?;

    Ok(SeedSummary {
        products: fixture.products.len(),
        coupons: fixture.coupons.len(),
        addresses: fixture.addresses.len(),
    })
}
