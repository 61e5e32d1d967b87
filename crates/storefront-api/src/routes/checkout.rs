//! `POST /checkout/reserve-and-initiate-payment`.

use crate::error::{extract_json, ApiError};
use crate::extractors::RequestIdentity;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use storefront_core::cart::CouponCode;
use storefront_core::checkout::{Address, CheckoutStage, Order, PaymentMethod};
use storefront_core::ids::{AddressId, ShippingMethodId};
use storefront_core::ports::PaymentIntent;
use storefront_core::services::{AddressSelection, CheckoutOutcome, CheckoutRequest};
use storefront_core::CommerceError;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/checkout/reserve-and-initiate-payment",
        post(reserve_and_initiate_payment),
    )
}

/// Checkout body. Accepts snake_case and camelCase field names.
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    #[serde(default, alias = "addressId")]
    pub address_id: Option<AddressId>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(alias = "shippingMethodId")]
    pub shipping_method_id: ShippingMethodId,
    #[serde(alias = "paymentMethod")]
    pub payment_method: PaymentMethod,
    #[serde(default, alias = "couponCode")]
    pub coupon_code: Option<String>,
    #[serde(default, alias = "acceptPriceChanges")]
    pub accept_price_changes: bool,
}

impl TryFrom<CheckoutBody> for CheckoutRequest {
    type Error = CommerceError;

    fn try_from(body: CheckoutBody) -> Result<Self, Self::Error> {
        let address = match (body.address_id, body.address) {
            (Some(address_id), None) => AddressSelection::Saved { address_id },
            (None, Some(address)) => AddressSelection::Inline { address },
            (Some(_), Some(_)) => {
                return Err(CommerceError::Validation(
                    "send either address_id or address, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(CommerceError::Validation(
                    "a shipping address is required".to_string(),
                ))
            }
        };
        Ok(CheckoutRequest {
            address,
            shipping_method_id: body.shipping_method_id,
            payment_method: body.payment_method,
            coupon_code: body
                .coupon_code
                .map(CouponCode::new)
                .filter(|c| !c.is_empty()),
            accept_price_changes: body.accept_price_changes,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub stage: CheckoutStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<PaymentIntent>,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            order: outcome.order,
            stage: outcome.stage,
            payment_intent: outcome.payment_intent,
        }
    }
}

pub async fn reserve_and_initiate_payment(
    State(state): State<AppState>,
    who: RequestIdentity,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let request = CheckoutRequest::try_from(extract_json(body)?)?;
    let outcome = state
        .storefront
        .checkout
        .checkout(&who.identity, request)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> CheckoutBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_camel_case_body() {
        let request = CheckoutRequest::try_from(body(serde_json::json!({
            "addressId": "addr_1",
            "shippingMethodId": "standard",
            "paymentMethod": "CASH_ON_DELIVERY",
            "couponCode": " save10 ",
        })))
        .unwrap();
        assert_eq!(
            request.address,
            AddressSelection::Saved {
                address_id: AddressId::new("addr_1")
            }
        );
        assert_eq!(request.coupon_code, Some(CouponCode::new("SAVE10")));
        assert!(!request.accept_price_changes);
    }

    #[test]
    fn test_address_is_required_once() {
        let missing = CheckoutRequest::try_from(body(serde_json::json!({
            "shipping_method_id": "standard",
            "payment_method": "CREDIT_CARD",
        })));
        assert!(matches!(missing, Err(CommerceError::Validation(_))));

        let both = CheckoutRequest::try_from(body(serde_json::json!({
            "address_id": "addr_1",
            "address": { "recipient": "Ada" },
            "shipping_method_id": "standard",
            "payment_method": "CREDIT_CARD",
        })));
        assert!(matches!(both, Err(CommerceError::Validation(_))));
    }

    #[test]
    fn test_blank_coupon_is_ignored() {
        let request = CheckoutRequest::try_from(body(serde_json::json!({
            "address": { "recipient": "Ada" },
            "shipping_method_id": "standard",
            "payment_method": "CREDIT_CARD",
            "coupon_code": "  ",
        })))
        .unwrap();
        assert_eq!(request.coupon_code, None);
    }
}
