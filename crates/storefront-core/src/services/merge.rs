//! Cart merge on login.

use crate::cart::Cart;
use crate::clock::Clock;
use crate::error::CommerceError;
use crate::identity::{CartToken, Identity};
use crate::ids::UserId;
use crate::services::CartResolver;
use crate::store::Store;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// False when there was no anonymous cart or it was empty.
    pub merged: bool,
    /// Anonymous lines folded into the user's cart.
    pub merged_lines: usize,
    /// The user's cart after the merge.
    pub cart: Cart,
}

#[derive(Clone)]
pub struct MergeService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    resolver: CartResolver,
}

impl MergeService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, resolver: CartResolver) -> Self {
        Self {
            store,
            clock,
            resolver,
        }
    }

    /// Fold the anonymous cart behind `token` into `user_id`'s cart.
    ///
    /// Transfer and discard happen in one transaction, so a retry after a
    /// failure cannot apply the lines twice. The caller clears the token
    /// credential after success.
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn merge(
        &self,
        token: Option<&CartToken>,
        user_id: &UserId,
    ) -> Result<MergeOutcome, CommerceError> {
        let identity = Identity::User(user_id.clone());
        let mut tx = self.store.begin().await?;

        let anonymous = match token {
            Some(token) => self.resolver.find_anonymous_in(tx.as_mut(), token).await?,
            None => None,
        };
        let anonymous = match anonymous {
            Some(cart) if !cart.is_empty() => cart,
            _ => {
                let resolved = self.resolver.resolve_in(tx.as_mut(), &identity).await?;
                tx.commit().await?;
                return Ok(MergeOutcome {
                    merged: false,
                    merged_lines: 0,
                    cart: resolved.cart,
                });
            }
        };

        let mut user_cart = self.resolver.resolve_in(tx.as_mut(), &identity).await?.cart;
        let merged_lines = user_cart.absorb(&anonymous.lines, self.clock.now());
        if user_cart.coupon_code.is_none() {
            user_cart.coupon_code = anonymous.coupon_code.clone();
        }

        tx.delete_cart(&anonymous.id).await?;
        tx.save_cart(&user_cart).await?;
        tx.commit().await?;

        info!(
            cart_id = %user_cart.id,
            anonymous_cart_id = %anonymous.id,
            merged_lines,
            "Merged anonymous cart"
        );
        Ok(MergeOutcome {
            merged: true,
            merged_lines,
            cart: user_cart,
        })
    }
}
