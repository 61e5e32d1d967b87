//! Storefront CLI - run and maintain the storefront service.
//!
//! Commands:
//! - `storefront serve` - Serve the HTTP API
//! - `storefront sweep-carts` - Delete idle anonymous carts
//! - `storefront expire-orders` - Cancel card orders that never got paid
//! - `storefront seed` - Load products, stock, coupons and addresses
//! - `storefront config` - Manage configuration

mod commands;
mod config;
mod context;
mod output;
mod telemetry;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{ConfigArgs, ExpireOrdersArgs, SeedArgs, ServeArgs, SweepCartsArgs};

/// Storefront - cart, checkout and order service
#[derive(Parser)]
#[command(name = "storefront")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "STOREFRONT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve(ServeArgs),

    /// Delete anonymous carts idle past the retention window
    SweepCarts(SweepCartsArgs),

    /// Cancel pending card orders past the payment timeout
    ExpireOrders(ExpireOrdersArgs),

    /// Load a fixture file into the store
    Seed(SeedArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = output::Output::new(cli.verbose, cli.json);

    let config_path = cli.config.as_deref();
    let ctx = context::Context::load(config_path, output)?;

    telemetry::init(&ctx.config.logging, cli.verbose);

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(args, &ctx).await,
        Commands::SweepCarts(args) => commands::maintenance::sweep_carts(args, &ctx).await,
        Commands::ExpireOrders(args) => commands::maintenance::expire_orders(args, &ctx).await,
        Commands::Seed(args) => commands::seed::run(args, &ctx).await,
        Commands::Config(args) => commands::config::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
