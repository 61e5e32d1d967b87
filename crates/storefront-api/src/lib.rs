//! # storefront-api
//!
//! JSON over HTTP for the storefront cart, checkout and order services.
//!
//! | Path                                        | Module               |
//! |---------------------------------------------|----------------------|
//! | `/cart`, `/cart/{line_id}`, `/cart/*`       | [`routes::cart`]     |
//! | `/checkout/reserve-and-initiate-payment`    | [`routes::checkout`] |
//! | `/orders/{id}`, `/orders/{id}/*`            | [`routes::orders`]   |
//! | `/health`                                   | [`routes::health`]   |
//!
//! ## Identity
//!
//! The authenticated user arrives in a header set by the upstream identity
//! provider. Anonymous carts travel as an HTTP-only `cart_token` cookie, with
//! an `x-cart-token` header fallback. See [`extractors::RequestIdentity`].
//!
//! ## Middleware (outermost first)
//!
//! ```text
//! SetRequestId → Trace → PropagateRequestId → Handler
//! ```

pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::{AppState, IdentitySettings};

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

/// Assemble the router with every route and the request middleware.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::x_request_id());

    Router::new()
        .route("/health", get(routes::health))
        .merge(routes::cart::router())
        .merge(routes::checkout::router())
        .merge(routes::orders::router())
        .layer(middleware)
        .with_state(state)
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::SET_COOKIE;
    use axum::http::{HeaderMap, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use storefront_core::ids::PaymentIntentId;
    use storefront_core::ports::{IntentStatus, LocalGateway, LogNotifier, StoreCatalog};
    use storefront_core::prelude::*;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        test_app_with_gateway().await.0
    }

    async fn test_app_with_gateway() -> (Router, Arc<LocalGateway>) {
        let store = Arc::new(MemoryStore::new());
        let mut tx = store.begin().await.unwrap();
        for (product, price, qty) in [("mug", 1_000, 5), ("lamp", 5_000, 1)] {
            let unit = SellableUnit::product(product);
            tx.put_catalog_entry(&CatalogEntry::new(
                unit.clone(),
                product.to_uppercase(),
                Money::new(price, Currency::USD),
            ))
            .await
            .unwrap();
            tx.put_inventory(&InventoryRecord::new(unit, qty)).await.unwrap();
        }
        tx.put_coupon(&Coupon::percentage("SAVE10", 10)).await.unwrap();
        tx.commit().await.unwrap();

        let settings = StorefrontSettings {
            shipping_methods: vec![ShippingMethod::new(
                "standard",
                "Standard",
                Money::new(599, Currency::USD),
            )],
            ..StorefrontSettings::default()
        };
        let gateway = Arc::new(LocalGateway::new());
        let with = Collaborators {
            catalog: Arc::new(StoreCatalog::new(store.clone())),
            gateway: gateway.clone(),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        };
        let storefront = Storefront::new(store, with, settings);
        (app(AppState::new(storefront, IdentitySettings::default())), gateway)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    fn inline_address() -> Value {
        json!({
            "recipient": "Ada Lovelace",
            "line1": "12 Analytical St",
            "city": "London",
            "postal_code": "N1 7GU",
            "country_code": "GB",
        })
    }

    #[tokio::test]
    async fn test_health_carries_request_id() {
        let app = test_app().await;
        let (status, headers, body) = send(&app, "GET", "/health", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
        assert!(headers.contains_key("x-request-id"));

        let (_, headers, _) =
            send(&app, "GET", "/health", &[("x-request-id", "req-42")], None).await;
        assert_eq!(headers.get("x-request-id").unwrap(), "req-42");
    }

    #[tokio::test]
    async fn test_anonymous_cart_issues_token_once() {
        let app = test_app().await;
        let (status, headers, cart) = send(
            &app,
            "POST",
            "/cart",
            &[],
            Some(json!({ "product_id": "mug", "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["item_count"], 2);
        assert!(headers
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("cart_token=ct_"));
        let token = headers.get("x-cart-token").unwrap().to_str().unwrap().to_string();

        let cookie = format!("cart_token={token}");
        let (status, headers, cart) =
            send(&app, "GET", "/cart", &[("cookie", cookie.as_str())], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["item_count"], 2);
        assert_eq!(cart["subtotal"]["amount_cents"], 2_000);
        assert!(!headers.contains_key(SET_COOKIE));
    }

    #[tokio::test]
    async fn test_update_and_remove_line() {
        let app = test_app().await;
        let user = [("x-authenticated-user", "user_1")];
        let (_, _, cart) = send(
            &app,
            "POST",
            "/cart",
            &user,
            Some(json!({ "productId": "mug" })),
        )
        .await;
        let line_id = cart["lines"][0]["line_id"].as_str().unwrap().to_string();

        let uri = format!("/cart/{line_id}");
        let (status, _, cart) =
            send(&app, "PUT", &uri, &user, Some(json!({ "quantity": 4 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["item_count"], 4);

        let (status, _, body) =
            send(&app, "PUT", &uri, &user, Some(json!({ "quantity": 0 }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _, cart) = send(&app, "DELETE", &uri, &user, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["item_count"], 0);

        let (status, _, body) = send(&app, "DELETE", &uri, &user, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_adding_beyond_stock_reports_issue() {
        let app = test_app().await;
        let (status, _, body) = send(
            &app,
            "POST",
            "/cart",
            &[("x-authenticated-user", "user_1")],
            Some(json!({ "product_id": "lamp", "quantity": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");
        let issue = &body["error"]["issues"][0];
        assert_eq!(issue["code"], "INSUFFICIENT_STOCK");
        assert_eq!(issue["requested"], 3);
        assert_eq!(issue["available"], 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = test_app().await;
        let (status, _, body) = send(
            &app,
            "POST",
            "/cart",
            &[],
            Some(json!({ "quantity": "lots" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_coupon_apply_and_remove() {
        let app = test_app().await;
        let user = [("x-authenticated-user", "user_1")];
        let line = json!({ "product_id": "mug", "quantity": 3 });
        send(&app, "POST", "/cart", &user, Some(line)).await;

        let (status, _, body) =
            send(&app, "POST", "/cart/apply-coupon", &user, Some(json!({ "code": "nope" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_COUPON");

        let (status, _, cart) =
            send(&app, "POST", "/cart/apply-coupon", &user, Some(json!({ "code": "save10" })))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cart["coupon_code"], "SAVE10");
        assert_eq!(cart["discount"]["amount_cents"], 300);
        assert_eq!(cart["total"]["amount_cents"], 2_700);

        let (status, _, cart) = send(
            &app,
            "POST",
            "/cart/apply-coupon",
            &user,
            Some(json!({ "action": "remove" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(cart.get("coupon_code").is_none());
        assert_eq!(cart["total"]["amount_cents"], 3_000);
    }

    #[tokio::test]
    async fn test_checkout_requires_authentication() {
        let app = test_app().await;
        let (status, _, body) = send(
            &app,
            "POST",
            "/checkout/reserve-and-initiate-payment",
            &[],
            Some(json!({
                "address": inline_address(),
                "shippingMethodId": "standard",
                "paymentMethod": "CASH_ON_DELIVERY",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn test_merge_then_cash_on_delivery_checkout() {
        let app = test_app().await;
        let (_, headers, _) = send(
            &app,
            "POST",
            "/cart",
            &[],
            Some(json!({ "product_id": "mug", "quantity": 2 })),
        )
        .await;
        let token = headers.get("x-cart-token").unwrap().to_str().unwrap().to_string();

        let user = ("x-authenticated-user", "user_1");
        let (status, headers, body) = send(
            &app,
            "POST",
            "/cart/merge",
            &[user, ("x-cart-token", token.as_str())],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["merged"], true);
        assert_eq!(body["merged_lines"], 1);
        assert_eq!(body["cart"]["item_count"], 2);
        assert!(headers
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));

        let (status, _, body) = send(
            &app,
            "POST",
            "/checkout/reserve-and-initiate-payment",
            &[user],
            Some(json!({
                "address": inline_address(),
                "shippingMethodId": "standard",
                "paymentMethod": "CASH_ON_DELIVERY",
                "couponCode": "SAVE10",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["stage"], "PLACED");
        assert_eq!(body["order"]["status"], "CASH_ON_DELIVERY_CONFIRMED");
        assert_eq!(body["order"]["grand_total"]["amount_cents"], 1_800 + 599);
        assert!(body.get("payment_intent").is_none());

        let order_id = body["order"]["id"].as_str().unwrap().to_string();
        let uri = format!("/orders/{order_id}");
        let (status, _, order) = send(&app, "GET", &uri, &[user], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["id"], order_id.as_str());

        let (status, _, _) =
            send(&app, "GET", &uri, &[("x-authenticated-user", "user_2")], None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, _, cart) = send(&app, "GET", "/cart", &[user], None).await;
        assert_eq!(cart["item_count"], 0);
    }

    #[tokio::test]
    async fn test_card_checkout_then_payment_confirmation() {
        let (app, gateway) = test_app_with_gateway().await;
        let user = [("x-authenticated-user", "user_1")];
        send(&app, "POST", "/cart", &user, Some(json!({ "product_id": "lamp" }))).await;

        let (status, _, body) = send(
            &app,
            "POST",
            "/checkout/reserve-and-initiate-payment",
            &user,
            Some(json!({
                "address": inline_address(),
                "shipping_method_id": "standard",
                "payment_method": "CREDIT_CARD",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["stage"], "AWAITING_PAYMENT");
        assert_eq!(body["order"]["status"], "PENDING_PAYMENT");
        let order_id = body["order"]["id"].as_str().unwrap().to_string();
        let intent_id = body["payment_intent"]["id"].as_str().unwrap().to_string();

        let uri = format!("/orders/{order_id}/payment");
        let (status, _, body) =
            send(&app, "POST", &uri, &[], Some(json!({ "intent_id": "pi_other" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        gateway
            .set_intent_status(&PaymentIntentId::new(intent_id.as_str()), IntentStatus::Succeeded)
            .unwrap();
        let (status, _, order) =
            send(&app, "POST", &uri, &[], Some(json!({ "intentId": intent_id }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "PAID");

        let cancel = format!("/orders/{order_id}/cancel");
        let (status, _, body) = send(&app, "POST", &cancel, &user, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_buyer_cannot_mark_own_order_paid() {
        let (app, gateway) = test_app_with_gateway().await;
        let user = [("x-authenticated-user", "user_1")];
        send(&app, "POST", "/cart", &user, Some(json!({ "product_id": "lamp" }))).await;
        let (_, _, body) = send(
            &app,
            "POST",
            "/checkout/reserve-and-initiate-payment",
            &user,
            Some(json!({
                "address": inline_address(),
                "shipping_method_id": "standard",
                "payment_method": "CREDIT_CARD",
            })),
        )
        .await;
        let order_id = body["order"]["id"].as_str().unwrap().to_string();
        let intent_id = body["payment_intent"]["id"].as_str().unwrap().to_string();

        // The intent id is visible to the buyer; claiming success must not settle it.
        let uri = format!("/orders/{order_id}/payment");
        let (status, _, order) = send(
            &app,
            "POST",
            &uri,
            &user,
            Some(json!({ "intent_id": intent_id, "succeeded": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "PENDING_PAYMENT");

        let (_, _, order) = send(&app, "GET", &format!("/orders/{order_id}"), &user, None).await;
        assert_eq!(order["status"], "PENDING_PAYMENT");

        gateway.set_unavailable(true);
        let (status, _, body) =
            send(&app, "POST", &uri, &user, Some(json!({ "intent_id": intent_id }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "PAYMENT_VERIFICATION_FAILED");
        assert_eq!(body["error"]["retryable"], true);
    }

    #[tokio::test]
    async fn test_cancel_pending_order_and_retry_is_refused() {
        let app = test_app().await;
        let user = [("x-authenticated-user", "user_1")];
        send(&app, "POST", "/cart", &user, Some(json!({ "product_id": "mug" }))).await;
        let (_, _, body) = send(
            &app,
            "POST",
            "/checkout/reserve-and-initiate-payment",
            &user,
            Some(json!({
                "address": inline_address(),
                "shipping_method_id": "standard",
                "payment_method": "CREDIT_CARD",
            })),
        )
        .await;
        let order_id = body["order"]["id"].as_str().unwrap().to_string();

        let (status, _, order) =
            send(&app, "POST", &format!("/orders/{order_id}/cancel"), &user, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "CANCELLED");

        let (status, _, body) = send(
            &app,
            "POST",
            &format!("/orders/{order_id}/payment-intent"),
            &user,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_STATE");
    }
}
