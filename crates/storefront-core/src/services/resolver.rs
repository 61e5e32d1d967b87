//! Cart identity resolver.

use crate::cart::Cart;
use crate::clock::Clock;
use crate::error::CommerceError;
use crate::identity::{CartOwner, CartToken, Identity};
use crate::settings::StorefrontSettings;
use crate::store::{Store, Transaction};
use std::sync::Arc;
use tracing::{debug, info};

/// A cart found or created for a request.
#[derive(Debug, Clone)]
pub struct ResolvedCart {
    pub cart: Cart,
    /// Set when a new anonymous credential was minted; the caller hands it to the client.
    pub issued_token: Option<CartToken>,
}

#[derive(Clone)]
pub struct CartResolver {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    settings: Arc<StorefrontSettings>,
}

impl CartResolver {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        settings: Arc<StorefrontSettings>,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Resolve (or lazily create) the caller's cart in its own transaction.
    pub async fn resolve(&self, identity: &Identity) -> Result<ResolvedCart, CommerceError> {
        let mut tx = self.store.begin().await?;
        let resolved = self.resolve_in(tx.as_mut(), identity).await?;
        tx.commit().await?;
        Ok(resolved)
    }

    /// Resolve inside the caller's transaction. New carts are saved before returning.
    pub async fn resolve_in(
        &self,
        tx: &mut dyn Transaction,
        identity: &Identity,
    ) -> Result<ResolvedCart, CommerceError> {
        let now = self.clock.now();
        match identity {
            Identity::User(user_id) => {
                let owner = CartOwner::User(user_id.clone());
                if let Some(cart) = tx.cart_for_owner(&owner).await? {
                    return Ok(ResolvedCart {
                        cart,
                        issued_token: None,
                    });
                }
                let cart = Cart::new(owner, self.settings.currency, now);
                tx.save_cart(&cart).await?;
                debug!(cart_id = %cart.id, user_id = %user_id, "Created user cart");
                Ok(ResolvedCart {
                    cart,
                    issued_token: None,
                })
            }
            Identity::Anonymous { token } => {
                if let Some(token) = token {
                    let owner = CartOwner::Token(token.clone());
                    if let Some(cart) = tx.cart_for_owner(&owner).await? {
                        if !cart.is_expired(self.settings.anonymous_retention, now) {
                            return Ok(ResolvedCart {
                                cart,
                                issued_token: None,
                            });
                        }
                        tx.delete_cart(&cart.id).await?;
                        debug!(cart_id = %cart.id, "Discarded expired anonymous cart");
                    }
                }
                let token = CartToken::generate();
                let cart = Cart::new(CartOwner::Token(token.clone()), self.settings.currency, now);
                tx.save_cart(&cart).await?;
                debug!(cart_id = %cart.id, "Created anonymous cart");
                Ok(ResolvedCart {
                    cart,
                    issued_token: Some(token),
                })
            }
        }
    }

    /// Find an anonymous cart by token without creating one. Expired carts count as absent.
    pub async fn find_anonymous_in(
        &self,
        tx: &mut dyn Transaction,
        token: &CartToken,
    ) -> Result<Option<Cart>, CommerceError> {
        let cart = tx.cart_for_owner(&CartOwner::Token(token.clone())).await?;
        let now = self.clock.now();
        Ok(cart.filter(|c| !c.is_expired(self.settings.anonymous_retention, now)))
    }

    /// Delete anonymous carts idle longer than the retention window.
    ///
    /// Idempotent; returns the number of carts deleted.
    pub async fn sweep_expired(&self) -> Result<u64, CommerceError> {
        let cutoff = self.clock.now() - self.settings.anonymous_retention;
        let mut tx = self.store.begin().await?;
        let deleted = tx.delete_anonymous_carts_inactive_since(cutoff).await?;
        tx.commit().await?;
        info!(deleted, cutoff = %cutoff, "Swept expired anonymous carts");
        Ok(deleted)
    }
}
