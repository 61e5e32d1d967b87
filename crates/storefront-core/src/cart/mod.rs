//! Cart types: the cart aggregate, coupons, and the cart read model.

mod cart;
mod coupon;
mod pricing;

pub use cart::{validate_quantity, Cart, CartLine, MAX_QUANTITY_PER_LINE};
pub use coupon::{Coupon, CouponCode, CouponKind, CouponRedemption, CouponRejection};
pub use pricing::{AppliedCoupon, CartLineView, CartView};
