//! Cart-to-order transactional core for the storefront.
//!
//! This crate owns everything between "add to cart" and "order placed":
//!
//! - **Inventory ledger**: on-hand and reserved quantities, conditional holds
//! - **Carts**: anonymous and user carts, token resolution, merge at login
//! - **Coupons**: validation, discount computation, redemption
//! - **Checkout**: validate, reserve, create the order, initiate payment
//! - **Orders**: payment confirmation, cancellation, fulfilment, expiry
//!
//! Persistence is behind [`store::Store`]; the catalog, payment gateway and
//! notification service are behind the traits in [`ports`].
//!
//! # Example
//!
//! ```rust,ignore
//! use storefront_core::prelude::*;
//!
//! let store = Arc::new(MemoryStore::new());
//! let storefront = Storefront::new(
//!     store.clone(),
//!     Collaborators::local(store),
//!     StorefrontSettings::default(),
//! );
//!
//! let user = Identity::User(UserId::new("user_1"));
//! storefront.carts.add_line(&user, &SellableUnit::product("lamp"), 2).await?;
//! let outcome = storefront.checkout.checkout(&user, request).await?;
//! println!("Placed {}", outcome.order.order_number);
//! ```

pub mod error;
pub mod ids;
pub mod money;

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod clock;
pub mod identity;
pub mod ports;
pub mod services;
pub mod settings;
pub mod store;

pub use error::CommerceError;
pub use ids::*;
pub use money::{Currency, Money};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::CommerceError;
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};

    // Catalog
    pub use crate::catalog::{CatalogEntry, InventoryRecord, ProductStatus, SellableUnit};

    // Cart
    pub use crate::cart::{
        AppliedCoupon, Cart, CartLine, CartLineView, CartView, Coupon, CouponCode, CouponKind,
        CouponRejection,
    };

    // Checkout
    pub use crate::checkout::{
        Address, CheckoutIssue, CheckoutStage, Order, OrderLine, OrderStatus, OrderTotals,
        PaymentMethod, SavedAddress, ShippingMethod, ShippingSelection,
    };

    // Identity and services
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::identity::{CartOwner, CartToken, Identity};
    pub use crate::services::{
        AddressSelection, CheckoutOutcome, CheckoutRequest, Collaborators, Storefront,
    };
    pub use crate::settings::StorefrontSettings;
    pub use crate::store::{MemoryStore, Store, StoreError, Transaction};
}
