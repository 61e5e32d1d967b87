//! Service configuration.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use storefront_api::IdentitySettings;
use storefront_core::checkout::ShippingMethod;
use storefront_core::money::{Currency, Money};
use storefront_core::settings::{
    StorefrontSettings, DEFAULT_ANONYMOUS_RETENTION_DAYS, DEFAULT_PENDING_PAYMENT_TIMEOUT_MINUTES,
};

/// Storefront configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorefrontConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub cart: CartConfig,

    #[serde(default)]
    pub checkout: CheckoutConfig,

    /// Shipping methods offered at checkout.
    #[serde(default = "default_shipping_methods")]
    pub shipping_methods: Vec<ShippingMethodConfig>,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StorefrontConfig {
    /// Load config from a file. `.json` files are JSON, everything else TOML.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Save config to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        let content = if path.ends_with(".json") {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path))
    }

    /// Runtime settings for the services.
    pub fn settings(&self) -> Result<StorefrontSettings> {
        let currency = Currency::from_code(&self.checkout.currency)
            .with_context(|| format!("Unknown currency: {}", self.checkout.currency))?;

        let shipping_methods = self
            .shipping_methods
            .iter()
            .map(|m| ShippingMethod {
                free_shipping_eligible: m.free_shipping_eligible,
                ..ShippingMethod::new(
                    m.id.as_str(),
                    m.name.as_str(),
                    Money::new(m.price_cents, currency),
                )
            })
            .collect();

        Ok(StorefrontSettings {
            currency,
            anonymous_retention: Duration::days(self.cart.anonymous_retention_days),
            pending_payment_timeout: Duration::minutes(
                self.checkout.pending_payment_timeout_minutes,
            ),
            tax_rate_bps: self.checkout.tax_rate_bps,
            shipping_methods,
        })
    }

    /// How identity travels over HTTP.
    pub fn identity_settings(&self) -> IdentitySettings {
        IdentitySettings {
            user_header: self.identity.user_header.to_lowercase(),
            cookie_name: self.cart.cookie_name.clone(),
            header_name: self.cart.header_name.to_lowercase(),
            secure_cookie: self.cart.secure_cookie,
            cookie_max_age: Duration::days(self.cart.anonymous_retention_days),
        }
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.store.max_connections == 0 {
            bail!("store.max_connections must be at least 1");
        }
        if self.cart.anonymous_retention_days <= 0 {
            bail!("cart.anonymous_retention_days must be positive");
        }
        if self.checkout.pending_payment_timeout_minutes <= 0 {
            bail!("checkout.pending_payment_timeout_minutes must be positive");
        }
        if !(0..=10_000).contains(&self.checkout.tax_rate_bps) {
            bail!("checkout.tax_rate_bps must be 0-10000");
        }
        for (i, method) in self.shipping_methods.iter().enumerate() {
            if method.id.is_empty() {
                bail!("shipping_methods[{}].id is required", i);
            }
            if method.price_cents < 0 {
                bail!("shipping_methods[{}].price_cents must not be negative", i);
            }
        }
        self.settings().map(|_| ())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Which store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    /// Process-local; everything is lost on exit.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite connection URL.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Pool size. One connection serializes every transaction; more run
    /// concurrently and report contention as a retryable conflict.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_store_url() -> String {
    "sqlite://storefront.db".to_string()
}

fn default_max_connections() -> u32 {
    1
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Anonymous cart configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartConfig {
    #[serde(default = "default_retention_days")]
    pub anonymous_retention_days: i64,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Header fallback for clients without cookies.
    #[serde(default = "default_header_name")]
    pub header_name: String,

    #[serde(default = "default_true")]
    pub secure_cookie: bool,
}

fn default_retention_days() -> i64 {
    DEFAULT_ANONYMOUS_RETENTION_DAYS
}

fn default_cookie_name() -> String {
    "cart_token".to_string()
}

fn default_header_name() -> String {
    "x-cart-token".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            anonymous_retention_days: default_retention_days(),
            cookie_name: default_cookie_name(),
            header_name: default_header_name(),
            secure_cookie: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default = "default_pending_timeout")]
    pub pending_payment_timeout_minutes: i64,

    /// Flat tax on the discounted subtotal, in basis points.
    #[serde(default)]
    pub tax_rate_bps: i64,

    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_pending_timeout() -> i64 {
    DEFAULT_PENDING_PAYMENT_TIMEOUT_MINUTES
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            pending_payment_timeout_minutes: default_pending_timeout(),
            tax_rate_bps: 0,
            currency: default_currency(),
        }
    }
}

/// A shipping method, priced in the checkout currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingMethodConfig {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    #[serde(default = "default_true")]
    pub free_shipping_eligible: bool,
}

fn default_shipping_methods() -> Vec<ShippingMethodConfig> {
    vec![ShippingMethodConfig {
        id: "standard".to_string(),
        name: "Standard".to_string(),
        price_cents: 599,
        free_shipping_eligible: true,
    }]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Header the upstream identity provider sets with the user id.
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

fn default_user_header() -> String {
    "x-authenticated-user".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Whether a config path names a JSON file.
pub fn is_json_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Generate a default storefront.toml config file.
pub fn generate_default_config() -> String {
    format!(
        r#"# Storefront service configuration

[server]
bind = "127.0.0.1:8080"

[store]
backend = "sqlite"          # or "memory"
url = "sqlite://storefront.db"
# More than one connection runs transactions concurrently (WAL);
# lock contention is then reported as CONCURRENCY_CONFLICT.
max_connections = 1

[cart]
anonymous_retention_days = {retention}
cookie_name = "cart_token"
header_name = "x-cart-token"
secure_cookie = true

[checkout]
pending_payment_timeout_minutes = {timeout}
tax_rate_bps = 0            # flat tax on (subtotal - discount), basis points
currency = "USD"

[[shipping_methods]]
id = "standard"
name = "Standard"
price_cents = 599
free_shipping_eligible = true

[[shipping_methods]]
id = "express"
name = "Express"
price_cents = 1500
free_shipping_eligible = false

[identity]
user_header = "x-authenticated-user"

[logging]
format = "human"            # or "json"
"#,
        retention = DEFAULT_ANONYMOUS_RETENTION_DAYS,
        timeout = DEFAULT_PENDING_PAYMENT_TIMEOUT_MINUTES,
    )
}
