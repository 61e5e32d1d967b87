//! Request-scoped identity and the cart cookie.

use crate::state::{AppState, IdentitySettings};
use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::convert::Infallible;
use storefront_core::identity::{CartToken, Identity};
use storefront_core::ids::UserId;

/// Who the request acts as, plus any anonymous cart token it presented.
///
/// An authenticated request still carries its token so the cart merge can
/// find the anonymous cart.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub identity: Identity,
    pub cart_token: Option<CartToken>,
}

impl RequestIdentity {
    pub fn from_headers(headers: &HeaderMap, settings: &IdentitySettings) -> Self {
        let cart_token = cookie_value(headers, &settings.cookie_name)
            .and_then(CartToken::parse)
            .or_else(|| {
                headers
                    .get(settings.header_name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .and_then(CartToken::parse)
            });

        let user = headers
            .get(settings.user_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let identity = match user {
            Some(user) => Identity::User(UserId::new(user)),
            None => Identity::anonymous(cart_token.clone()),
        };
        Self {
            identity,
            cart_token,
        }
    }
}

impl FromRequestParts<AppState> for RequestIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, &state.identity))
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
}

/// Hand a newly issued token back as a cookie and in the fallback header.
pub fn issue_token(headers: &mut HeaderMap, settings: &IdentitySettings, token: &CartToken) {
    let cookie = cookie_attributes(
        settings,
        &format!("{}={}", settings.cookie_name, token.as_str()),
        settings.cookie_max_age.num_seconds(),
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.append(SET_COOKIE, value);
    }
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(settings.header_name.as_bytes()),
        HeaderValue::from_str(token.as_str()),
    ) {
        headers.insert(name, value);
    }
}

/// Expire the cart cookie, used once the anonymous cart has been merged away.
pub fn clear_token(headers: &mut HeaderMap, settings: &IdentitySettings) {
    let cookie = cookie_attributes(settings, &format!("{}=", settings.cookie_name), 0);
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.append(SET_COOKIE, value);
    }
}

fn cookie_attributes(settings: &IdentitySettings, pair: &str, max_age: i64) -> String {
    let mut cookie = format!("{pair}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
    if settings.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_user_header_wins() {
        let token = CartToken::generate();
        let map = headers(&[
            ("x-authenticated-user", "user_7"),
            ("x-cart-token", token.as_str()),
        ]);
        let req = RequestIdentity::from_headers(&map, &IdentitySettings::default());
        assert_eq!(req.identity, Identity::User(UserId::new("user_7")));
        assert_eq!(req.cart_token, Some(token));
    }

    #[test]
    fn test_cookie_then_header_fallback() {
        let from_cookie = CartToken::generate();
        let from_header = CartToken::generate();
        let cookie = format!("theme=dark; cart_token={}", from_cookie.as_str());
        let map = headers(&[("cookie", cookie.as_str()), ("x-cart-token", from_header.as_str())]);
        let req = RequestIdentity::from_headers(&map, &IdentitySettings::default());
        assert_eq!(req.identity, Identity::anonymous(Some(from_cookie)));

        let map = headers(&[("x-cart-token", from_header.as_str())]);
        let req = RequestIdentity::from_headers(&map, &IdentitySettings::default());
        assert_eq!(req.identity, Identity::anonymous(Some(from_header)));
    }

    #[test]
    fn test_malformed_token_is_ignored() {
        let map = headers(&[("cookie", "cart_token=not-a-token")]);
        let req = RequestIdentity::from_headers(&map, &IdentitySettings::default());
        assert_eq!(req.identity, Identity::anonymous(None));
    }

    #[test]
    fn test_issued_cookie_attributes() {
        let token = CartToken::generate();
        let mut map = HeaderMap::new();
        issue_token(&mut map, &IdentitySettings::default(), &token);

        let cookie = map.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("cart_token={}", token.as_str())));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.ends_with("; Secure"));
        assert_eq!(map.get("x-cart-token").unwrap(), token.as_str());
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let settings = IdentitySettings {
            secure_cookie: false,
            ..IdentitySettings::default()
        };
        let mut map = HeaderMap::new();
        clear_token(&mut map, &settings);
        let cookie = map.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("cart_token=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(!cookie.contains("Secure"));
    }
}
