//! Services: the operations behind every endpoint and maintenance job.

mod carts;
mod checkout;
mod coupons;
mod ledger;
mod merge;
mod orders;
mod resolver;

#[cfg(test)]
pub(crate) mod testing;

pub use carts::{CartResponse, CartService};
pub use checkout::{AddressSelection, CheckoutOutcome, CheckoutRequest, CheckoutService};
pub use coupons::CouponEngine;
pub use ledger::InventoryLedger;
pub use merge::{MergeOutcome, MergeService};
pub use orders::{OrderService, PAYMENT_TIMEOUT_REASON};
pub use resolver::{CartResolver, ResolvedCart};

use crate::clock::{Clock, SystemClock};
use crate::ports::{Catalog, LocalGateway, LogNotifier, Notifier, PaymentGateway, StoreCatalog};
use crate::settings::StorefrontSettings;
use crate::store::Store;
use std::sync::Arc;

/// External collaborators a storefront is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Store-backed catalog, local gateway, log notifications and wall-clock time.
    pub fn local(store: Arc<dyn Store>) -> Self {
        Self {
            catalog: Arc::new(StoreCatalog::new(store)),
            gateway: Arc::new(LocalGateway::new()),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Every service, wired to one store.
#[derive(Clone)]
pub struct Storefront {
    pub store: Arc<dyn Store>,
    pub settings: Arc<StorefrontSettings>,
    pub ledger: InventoryLedger,
    pub resolver: CartResolver,
    pub coupons: CouponEngine,
    pub carts: CartService,
    pub merge: MergeService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
}

impl Storefront {
    pub fn new(store: Arc<dyn Store>, with: Collaborators, settings: StorefrontSettings) -> Self {
        let settings = Arc::new(settings);
        let ledger = InventoryLedger::new(store.clone());
        let resolver = CartResolver::new(store.clone(), with.clock.clone(), settings.clone());
        let coupons = CouponEngine::new(store.clone(), with.clock.clone());
        let carts = CartService::new(
            store.clone(),
            with.catalog.clone(),
            with.clock.clone(),
            resolver.clone(),
            coupons.clone(),
        );
        let merge = MergeService::new(store.clone(), with.clock.clone(), resolver.clone());
        let checkout = CheckoutService::new(
            store.clone(),
            with.catalog.clone(),
            with.gateway.clone(),
            with.notifier.clone(),
            with.clock.clone(),
            settings.clone(),
            coupons.clone(),
            ledger.clone(),
        );
        let orders = OrderService::new(
            store.clone(),
            with.gateway.clone(),
            with.notifier.clone(),
            with.clock.clone(),
            settings.clone(),
        );
        Self {
            store,
            settings,
            ledger,
            resolver,
            coupons,
            carts,
            merge,
            checkout,
            orders,
        }
    }
}
