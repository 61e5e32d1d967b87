//! Maintenance sweeps, run from cron or by hand. Both are idempotent.

use anyhow::{bail, Result};
use chrono::Duration;
use serde_json::json;

use super::{ExpireOrdersArgs, SweepCartsArgs};
use crate::context::Context;

/// Delete anonymous carts idle past the retention window.
pub async fn sweep_carts(args: SweepCartsArgs, ctx: &Context) -> Result<()> {
    let mut settings = ctx.config.settings()?;
    if let Some(days) = args.retention_days {
        if days <= 0 {
            bail!("--retention-days must be positive");
        }
        settings.anonymous_retention = Duration::days(days);
    }
    let days = settings.anonymous_retention.num_days();

    let storefront = ctx.storefront_with(settings).await?;
    let deleted = storefront.resolver.sweep_expired().await?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({ "deleted": deleted, "retention_days": days }));
    } else {
        ctx.output.success(&format!(
            "Deleted {} anonymous cart(s) idle for more than {} day(s)",
            deleted, days
        ));
    }
    Ok(())
}

/// Cancel card orders that waited too long for payment, releasing their stock.
pub async fn expire_orders(args: ExpireOrdersArgs, ctx: &Context) -> Result<()> {
    let mut settings = ctx.config.settings()?;
    if let Some(minutes) = args.timeout_minutes {
        if minutes <= 0 {
            bail!("--timeout-minutes must be positive");
        }
        settings.pending_payment_timeout = Duration::minutes(minutes);
    }
    let minutes = settings.pending_payment_timeout.num_minutes();

    let storefront = ctx.storefront_with(settings).await?;
    let expired = storefront.orders.expire_pending().await?;

    if ctx.output.is_json() {
        ctx.output.json(&json!({ "expired": expired, "timeout_minutes": minutes }));
    } else if expired == 0 {
        ctx.output.info("No pending orders past the payment timeout");
    } else {
        ctx.output.success(&format!(
            "Cancelled {} order(s) pending payment for more than {} minute(s)",
            expired, minutes
        ));
    }
    Ok(())
}
