//! Shared fixture for service tests.

use crate::cart::Coupon;
use crate::catalog::{CatalogEntry, InventoryRecord, ProductStatus, SellableUnit};
use crate::checkout::{Address, SavedAddress, ShippingMethod};
use crate::clock::{Clock, ManualClock};
use crate::identity::Identity;
use crate::ids::{AddressId, UserId};
use crate::money::{Currency, Money};
use crate::ports::{LocalGateway, Notifier, NotifyError, OrderEvent, StoreCatalog};
use crate::services::{Collaborators, Storefront};
use crate::settings::StorefrontSettings;
use crate::store::{MemoryStore, Store};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub events: Mutex<Vec<OrderEvent>>,
    pub failing: AtomicBool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError("mail relay down".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub(crate) struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<LocalGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub storefront: Storefront,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_settings(StorefrontSettings {
            shipping_methods: vec![
                ShippingMethod::new("standard", "Standard", Money::new(599, Currency::USD)),
                ShippingMethod {
                    free_shipping_eligible: false,
                    ..ShippingMethod::new("express", "Express", Money::new(1_500, Currency::USD))
                },
            ],
            ..StorefrontSettings::default()
        })
        .await
    }

    pub async fn with_settings(settings: StorefrontSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gateway = Arc::new(LocalGateway::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let storefront = Storefront::new(
            store.clone(),
            Collaborators {
                catalog: Arc::new(StoreCatalog::new(store.clone())),
                gateway: gateway.clone(),
                notifier: notifier.clone(),
                clock: clock.clone(),
            },
            settings,
        );
        Self {
            store,
            clock,
            gateway,
            notifier,
            storefront,
        }
    }

    pub fn currency(&self) -> Currency {
        Currency::USD
    }

    pub fn user(&self, id: &str) -> Identity {
        Identity::User(UserId::new(id))
    }

    /// Catalog entry plus on-hand stock for a product.
    pub async fn stock(&self, product: &str, price_cents: i64, quantity: i64) {
        let unit = SellableUnit::product(product);
        let mut tx = self.store.begin().await.unwrap();
        tx.put_catalog_entry(&CatalogEntry::new(
            unit.clone(),
            product.to_uppercase(),
            Money::new(price_cents, self.currency()),
        ))
        .await
        .unwrap();
        tx.put_inventory(&InventoryRecord::new(unit, quantity))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn set_price(&self, product: &str, price_cents: i64) {
        self.update_entry(product, |e| e.unit_price.amount_cents = price_cents)
            .await;
    }

    pub async fn set_status(&self, product: &str, status: ProductStatus) {
        self.update_entry(product, |e| e.status = status).await;
    }

    async fn update_entry(&self, product: &str, f: impl FnOnce(&mut CatalogEntry)) {
        let unit = SellableUnit::product(product);
        let mut tx = self.store.begin().await.unwrap();
        let mut entry = tx.catalog_entry(&unit).await.unwrap().unwrap();
        f(&mut entry);
        tx.put_catalog_entry(&entry).await.unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn coupon(&self, coupon: Coupon) {
        let mut tx = self.store.begin().await.unwrap();
        tx.put_coupon(&coupon).await.unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn saved_address(&self, user: &str) -> AddressId {
        let saved = SavedAddress::new(UserId::new(user), address());
        let mut tx = self.store.begin().await.unwrap();
        tx.put_address(&saved).await.unwrap();
        tx.commit().await.unwrap();
        saved.id
    }

    pub async fn inventory(&self, product: &str) -> InventoryRecord {
        let mut tx = self.store.begin().await.unwrap();
        tx.inventory(&SellableUnit::product(product))
            .await
            .unwrap()
            .unwrap()
    }

    pub fn now(&self) -> chrono::DateTime<Utc> {
        self.clock.now()
    }
}

pub(crate) fn address() -> Address {
    Address::new("Ada Lovelace", "12 Analytical St", "London", "N1 7GU", "GB")
}

pub(crate) fn checkout_request(
    payment_method: crate::checkout::PaymentMethod,
) -> crate::services::CheckoutRequest {
    crate::services::CheckoutRequest {
        address: crate::services::AddressSelection::Inline { address: address() },
        shipping_method_id: "standard".into(),
        payment_method,
        coupon_code: None,
        accept_price_changes: false,
    }
}

impl Fixture {
    /// Put `qty` of an already stocked `product` in the cart of `user` and check out.
    pub async fn place_order(
        &self,
        user: &str,
        product: &str,
        qty: i64,
        payment_method: crate::checkout::PaymentMethod,
    ) -> crate::services::CheckoutOutcome {
        let identity = self.user(user);
        self.storefront
            .carts
            .add_line(&identity, &SellableUnit::product(product), qty)
            .await
            .unwrap();
        self.storefront
            .checkout
            .checkout(&identity, checkout_request(payment_method))
            .await
            .unwrap()
    }
}
