//! Shared application state.

use chrono::Duration;
use storefront_core::services::Storefront;
use storefront_core::settings::DEFAULT_ANONYMOUS_RETENTION_DAYS;

/// How request identity travels over HTTP.
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    /// Header set by the upstream identity provider with the authenticated user id.
    pub user_header: String,
    pub cookie_name: String,
    /// Fallback for clients that cannot keep cookies.
    pub header_name: String,
    /// Add `Secure` to the cart cookie.
    pub secure_cookie: bool,
    pub cookie_max_age: Duration,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            user_header: "x-authenticated-user".to_string(),
            cookie_name: "cart_token".to_string(),
            header_name: "x-cart-token".to_string(),
            secure_cookie: true,
            cookie_max_age: Duration::days(DEFAULT_ANONYMOUS_RETENTION_DAYS),
        }
    }
}

/// Shared state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub storefront: Storefront,
    pub identity: IdentitySettings,
}

impl AppState {
    pub fn new(storefront: Storefront, identity: IdentitySettings) -> Self {
        Self {
            storefront,
            identity,
        }
    }
}
