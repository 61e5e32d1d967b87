//! Configuration management commands.

use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use console::Term;
use dialoguer::Confirm;

use super::{ConfigArgs, ConfigCommand};
use crate::config::{generate_default_config, is_json_path, StorefrontConfig};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Init { path, force } => init_config(&path, force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    let config = &ctx.config;
    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    ctx.output.info("[server]");
    ctx.output.kv("bind", &config.server.bind.to_string());

    ctx.output.info("[store]");
    ctx.output.kv("backend", &format!("{:?}", config.store.backend).to_lowercase());
    ctx.output.kv("url", &config.store.url);
    ctx.output
        .kv("max_connections", &config.store.max_connections.to_string());

    ctx.output.info("[cart]");
    ctx.output.kv(
        "anonymous_retention_days",
        &config.cart.anonymous_retention_days.to_string(),
    );
    ctx.output.kv("cookie_name", &config.cart.cookie_name);
    ctx.output.kv("header_name", &config.cart.header_name);
    ctx.output.kv("secure_cookie", &config.cart.secure_cookie.to_string());

    ctx.output.info("[checkout]");
    ctx.output.kv(
        "pending_payment_timeout_minutes",
        &config.checkout.pending_payment_timeout_minutes.to_string(),
    );
    ctx.output
        .kv("tax_rate_bps", &config.checkout.tax_rate_bps.to_string());
    ctx.output.kv("currency", &config.checkout.currency);

    ctx.output.info("[[shipping_methods]]");
    for method in &config.shipping_methods {
        let waivable = if method.free_shipping_eligible {
            ""
        } else {
            " (never free)"
        };
        ctx.output.list_item(&format!(
            "{} \"{}\" {} cents{}",
            method.id, method.name, method.price_cents, waivable
        ));
    }

    ctx.output.info("[identity]");
    ctx.output.kv("user_header", &config.identity.user_header);

    ctx.output.info("[logging]");
    ctx.output
        .kv("format", &format!("{:?}", config.logging.format).to_lowercase());

    Ok(())
}

fn init_config(path: &str, force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.resolve_path(path);

    if config_path.exists() && !force && !confirm_overwrite(&config_path)? {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    if is_json_path(&config_path) {
        StorefrontConfig::default().save(&config_path.to_string_lossy())?;
    } else {
        fs::write(&config_path, generate_default_config())?;
    }
    ctx.output
        .success(&format!("Created: {}", config_path.display()));

    Ok(())
}

/// Ask before clobbering a file, but only when someone is there to answer.
fn confirm_overwrite(path: &Path) -> Result<bool> {
    if !Term::stderr().is_term() {
        return Ok(false);
    }
    let confirmed = Confirm::new()
        .with_prompt(format!("Overwrite {}?", path.display()))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");
    ctx.config.validate()?;
    ctx.output.success("Configuration is valid");
    Ok(())
}
