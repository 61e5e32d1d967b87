//! Request-scoped identity and cart ownership.
//!
//! The identity provider is external: an authenticated request arrives with a
//! stable [`UserId`], an anonymous one with at most a bearer [`CartToken`].

use crate::ids::UserId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Random bytes in a cart token.
const TOKEN_BYTES: usize = 24;
const TOKEN_PREFIX: &str = "ct_";

/// Opaque bearer credential for an anonymous cart.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartToken(String);

impl CartToken {
    /// Issue a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Accept a presented token if it is well formed.
    ///
    /// Malformed values are treated as absent rather than as an error.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let body = raw.strip_prefix(TOKEN_PREFIX)?;
        let decoded = URL_SAFE_NO_PAD.decode(body).ok()?;
        (decoded.len() == TOKEN_BYTES).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for CartToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CartToken(..)")
    }
}

/// Who a request is acting as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Authenticated principal.
    User(UserId),
    /// Anonymous visitor, possibly presenting a cart token.
    Anonymous { token: Option<CartToken> },
}

impl Identity {
    pub fn anonymous(token: Option<CartToken>) -> Self {
        Identity::Anonymous { token }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Identity::User(id) => Some(id),
            Identity::Anonymous { .. } => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User(_))
    }
}

/// The single owner of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(UserId),
    Token(CartToken),
}

impl CartOwner {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, CartOwner::Token(_))
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            CartOwner::User(id) => Some(id),
            CartOwner::Token(_) => None,
        }
    }

    pub fn token(&self) -> Option<&CartToken> {
        match self {
            CartOwner::Token(token) => Some(token),
            CartOwner::User(_) => None,
        }
    }
}
