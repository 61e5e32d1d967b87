//! Order endpoints under `/orders/{id}`.

use crate::error::{extract_json, ApiError};
use crate::extractors::RequestIdentity;
use crate::routes::checkout::CheckoutResponse;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use storefront_core::checkout::Order;
use storefront_core::ids::{OrderId, PaymentIntentId};

const CUSTOMER_CANCEL_REASON: &str = "cancelled by customer";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/orders/{id}/payment", post(confirm_payment))
        .route("/orders/{id}/payment-intent", post(retry_payment_intent))
}

/// Names the intent to settle. Any outcome fields in the body are ignored;
/// the verdict is read from the gateway.
#[derive(Debug, Deserialize)]
pub struct PaymentConfirmation {
    #[serde(alias = "intentId")]
    pub intent_id: PaymentIntentId,
}

pub async fn get_order(
    State(state): State<AppState>,
    who: RequestIdentity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    let order = state.storefront.orders.get(&who.identity, &id).await?;
    Ok(Json(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    who: RequestIdentity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .storefront
        .orders
        .cancel(&who.identity, &id, CUSTOMER_CANCEL_REASON)
        .await?;
    Ok(Json(order))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    body: Result<Json<PaymentConfirmation>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let req = extract_json(body)?;
    let order = state
        .storefront
        .orders
        .confirm_payment(&id, &req.intent_id)
        .await?;
    Ok(Json(order))
}

/// Create a fresh intent for a card order whose first initiation failed.
pub async fn retry_payment_intent(
    State(state): State<AppState>,
    who: RequestIdentity,
    Path(id): Path<OrderId>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let outcome = state
        .storefront
        .checkout
        .retry_payment(&who.identity, &id)
        .await?;
    Ok(Json(outcome.into()))
}
