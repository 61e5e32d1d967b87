//! Run the HTTP API.

use anyhow::{Context as _, Result};
use storefront_api::AppState;
use tracing::{info, warn};

use super::ServeArgs;
use crate::config::StoreBackend;
use crate::context::Context;

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    let bind = args.bind.unwrap_or(ctx.config.server.bind);

    if ctx.config.store.backend == StoreBackend::Memory {
        ctx.output
            .warn("Serving from the in-memory store; carts and orders are lost on exit");
    }

    let storefront = ctx.storefront().await?;
    let state = AppState::new(storefront, ctx.config.identity_settings());

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!(%bind, backend = ?ctx.config.store.backend, "Storefront listening");
    ctx.output.success(&format!("Listening on http://{}", bind));

    axum::serve(listener, storefront_api::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Storefront stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
