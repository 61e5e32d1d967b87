//! Checkout types: addresses, shipping, payment, orders and the attempt state machine.

mod address;
mod flow;
mod issue;
mod order;
mod payment;
mod shipping;

pub use address::{Address, SavedAddress};
pub use flow::CheckoutStage;
pub use issue::CheckoutIssue;
pub use order::{
    allocate_discount, Order, OrderLine, OrderStatus, OrderTotals, ReservationHold,
    ReservationState,
};
pub use payment::{CardPayment, CashOnDelivery, PaymentFlow, PaymentMethod};
pub use shipping::{ShippingMethod, ShippingSelection};
