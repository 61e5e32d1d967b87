//! Cart endpoints: `/cart`, `/cart/{line_id}`, `/cart/apply-coupon`, `/cart/merge`.

use crate::error::{extract_json, ApiError};
use crate::extractors::{clear_token, issue_token, RequestIdentity};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use storefront_core::cart::{CartView, CouponCode};
use storefront_core::catalog::SellableUnit;
use storefront_core::ids::{LineId, ProductId, VariantId};
use storefront_core::services::CartResponse;
use storefront_core::CommerceError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).post(add_line))
        .route("/cart/apply-coupon", post(apply_coupon))
        .route("/cart/merge", post(merge))
        .route("/cart/{line_id}", put(update_line).delete(remove_line))
}

#[derive(Debug, Deserialize)]
pub struct AddLineRequest {
    #[serde(alias = "productId")]
    pub product_id: ProductId,
    #[serde(default, alias = "variantId")]
    pub variant_id: Option<VariantId>,
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

impl AddLineRequest {
    fn unit(&self) -> SellableUnit {
        SellableUnit {
            product_id: self.product_id.clone(),
            variant_id: self.variant_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// `{ "code": "SAVE10" }` applies, `{ "action": "remove" }` detaches.
#[derive(Debug, Deserialize)]
pub struct CouponRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub merged: bool,
    pub merged_lines: usize,
    pub cart: CartView,
}

/// Render the cart, handing back a token when one was just issued.
fn cart_response(state: &AppState, response: CartResponse) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(token) = &response.issued_token {
        issue_token(&mut headers, &state.identity, token);
    }
    (headers, Json(response.cart)).into_response()
}

pub async fn get_cart(
    State(state): State<AppState>,
    who: RequestIdentity,
) -> Result<Response, ApiError> {
    let response = state.storefront.carts.view(&who.identity).await?;
    Ok(cart_response(&state, response))
}

pub async fn add_line(
    State(state): State<AppState>,
    who: RequestIdentity,
    body: Result<Json<AddLineRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = extract_json(body)?;
    let response = state
        .storefront
        .carts
        .add_line(&who.identity, &req.unit(), req.quantity)
        .await?;
    Ok(cart_response(&state, response))
}

pub async fn update_line(
    State(state): State<AppState>,
    who: RequestIdentity,
    Path(line_id): Path<LineId>,
    body: Result<Json<UpdateQuantityRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = extract_json(body)?;
    let response = state
        .storefront
        .carts
        .update_quantity(&who.identity, &line_id, req.quantity)
        .await?;
    Ok(cart_response(&state, response))
}

pub async fn remove_line(
    State(state): State<AppState>,
    who: RequestIdentity,
    Path(line_id): Path<LineId>,
) -> Result<Response, ApiError> {
    let response = state
        .storefront
        .carts
        .remove_line(&who.identity, &line_id)
        .await?;
    Ok(cart_response(&state, response))
}

pub async fn apply_coupon(
    State(state): State<AppState>,
    who: RequestIdentity,
    body: Result<Json<CouponRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = extract_json(body)?;
    let carts = &state.storefront.carts;
    let response = match (req.action.as_deref(), req.code) {
        (Some("remove"), _) => carts.remove_coupon(&who.identity).await?,
        (Some(other), _) => {
            return Err(ApiError::BadRequest(format!("unknown coupon action: {other}")));
        }
        (None, Some(code)) => carts.apply_coupon(&who.identity, &CouponCode::new(code)).await?,
        (None, None) => {
            return Err(CommerceError::Validation("coupon code is required".to_string()).into());
        }
    };
    Ok(cart_response(&state, response))
}

/// Fold the presented anonymous cart into the authenticated user's cart.
pub async fn merge(
    State(state): State<AppState>,
    who: RequestIdentity,
) -> Result<Response, ApiError> {
    let user_id = who.identity.user_id().ok_or(CommerceError::AuthRequired)?;
    let outcome = state
        .storefront
        .merge
        .merge(who.cart_token.as_ref(), user_id)
        .await?;
    let view = state.storefront.carts.view(&who.identity).await?;

    let mut headers = HeaderMap::new();
    if who.cart_token.is_some() {
        clear_token(&mut headers, &state.identity);
    }
    let body = MergeResponse {
        merged: outcome.merged,
        merged_lines: outcome.merged_lines,
        cart: view.cart,
    };
    Ok((headers, Json(body)).into_response())
}
