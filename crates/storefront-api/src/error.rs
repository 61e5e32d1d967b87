//! # API Error Types
//!
//! Maps [`CommerceError`] to HTTP status codes and a structured JSON body:
//!
//! ```text
//! { "error": { "code": "INSUFFICIENT_STOCK", "message": "...", "issues": [...] } }
//! ```
//!
//! Internal failures are logged in full and returned with a generic message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use storefront_core::checkout::CheckoutIssue;
use storefront_core::ids::OrderId;
use storefront_core::CommerceError;
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable code, e.g. `INSUFFICIENT_STOCK`.
    pub code: String,
    pub message: String,
    /// Every per-line problem found, for stock, price and rejection errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<CheckoutIssue>>,
    /// The order that was created before payment initiation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub retryable: bool,
}

/// Error type returned by every handler.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Commerce(#[from] CommerceError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Commerce(e) => (status_for(e), e.code()),
        }
    }
}

fn status_for(e: &CommerceError) -> StatusCode {
    match e {
        CommerceError::Validation(_)
        | CommerceError::InvalidQuantity(_)
        | CommerceError::QuantityExceedsLimit(..)
        | CommerceError::CurrencyMismatch { .. }
        | CommerceError::Overflow => StatusCode::UNPROCESSABLE_ENTITY,
        CommerceError::InsufficientStock { .. }
        | CommerceError::PriceChanged { .. }
        | CommerceError::CheckoutRejected { .. }
        | CommerceError::InvalidCoupon(_)
        | CommerceError::ConcurrencyConflict(_)
        | CommerceError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CommerceError::AuthRequired => StatusCode::UNAUTHORIZED,
        CommerceError::LineNotFound(_)
        | CommerceError::ProductNotFound(_)
        | CommerceError::OrderNotFound(_)
        | CommerceError::AddressNotFound(_)
        | CommerceError::ShippingMethodNotFound(_) => StatusCode::NOT_FOUND,
        CommerceError::PaymentInitiation { .. } | CommerceError::PaymentVerification(_) => {
            StatusCode::BAD_GATEWAY
        }
        CommerceError::Store(_) | CommerceError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let detail = match &self {
            Self::Commerce(e) if e.is_internal() => {
                tracing::error!(error = %e, "internal server error");
                ErrorDetail {
                    code: code.to_string(),
                    message: "An internal error occurred".to_string(),
                    issues: None,
                    order_id: None,
                    retryable: false,
                }
            }
            Self::Commerce(e) => ErrorDetail {
                code: code.to_string(),
                message: e.to_string(),
                issues: e.issues().map(<[CheckoutIssue]>::to_vec),
                order_id: match e {
                    CommerceError::PaymentInitiation { order_id, .. } => Some(order_id.clone()),
                    _ => None,
                },
                retryable: e.is_retryable(),
            },
            Self::BadRequest(message) => ErrorDetail {
                code: code.to_string(),
                message: message.clone(),
                issues: None,
                order_id: None,
                retryable: false,
            },
        };

        (status, Json(ErrorBody { error: detail })).into_response()
    }
}

/// Extract a JSON body, mapping deserialization errors to [`ApiError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| ApiError::BadRequest(err.body_text()))
}
