//! External collaborators.
//!
//! The catalog, payment gateway and notification service live outside this
//! core; these traits are the contract it expects from them.

mod catalog;
mod gateway;
mod notify;

pub use catalog::{Catalog, StoreCatalog};
pub use gateway::{GatewayError, IntentStatus, LocalGateway, PaymentGateway, PaymentIntent};
pub use notify::{LogNotifier, Notifier, NotifyError, OrderEvent};
