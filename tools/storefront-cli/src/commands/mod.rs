//! CLI command implementations.

pub mod config;
pub mod maintenance;
pub mod seed;
pub mod serve;

use std::net::SocketAddr;

use clap::{Args, Subcommand};

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.bind).
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,
}

/// Arguments for the sweep-carts command.
#[derive(Args)]
pub struct SweepCartsArgs {
    /// Idle days after which an anonymous cart is deleted
    /// (overrides cart.anonymous_retention_days).
    #[arg(long)]
    pub retention_days: Option<i64>,
}

/// Arguments for the expire-orders command.
#[derive(Args)]
pub struct ExpireOrdersArgs {
    /// Minutes a card order may wait for payment
    /// (overrides checkout.pending_payment_timeout_minutes).
    #[arg(long)]
    pub timeout_minutes: Option<i64>,
}

/// Arguments for the seed command.
#[derive(Args)]
pub struct SeedArgs {
    /// Fixture file (TOML, or JSON by extension).
    pub fixture: String,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration.
    Show,
    /// Write a default config file.
    Init {
        /// Output path.
        #[arg(default_value = "storefront.toml")]
        path: String,
        /// Overwrite an existing file without asking.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}
