//! CLI execution context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use storefront_core::services::{Collaborators, Storefront};
use storefront_core::settings::StorefrontSettings;
use storefront_core::store::{MemoryStore, Store};
use storefront_db::SqliteStore;

use crate::config::{StoreBackend, StorefrontConfig};
use crate::output::Output;

/// Config file names searched from the working directory upwards.
pub const CONFIG_NAMES: [&str; 3] = ["storefront.toml", ".storefront.toml", "storefront.json"];

/// Execution context for CLI commands.
pub struct Context {
    pub config: StorefrontConfig,
    /// Where the config was read from, if anywhere.
    pub config_path: Option<PathBuf>,
    pub output: Output,
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (config, config_path) = if let Some(path) = config_path {
            (StorefrontConfig::load(path)?, Some(PathBuf::from(path)))
        } else {
            match Self::find_config(&cwd) {
                Some((config, path)) => (config, Some(path)),
                None => (StorefrontConfig::default(), None),
            }
        };

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Find config file in directory tree.
    fn find_config(start: &Path) -> Option<(StorefrontConfig, PathBuf)> {
        let mut current = start.to_path_buf();
        loop {
            for name in &CONFIG_NAMES {
                let config_path = current.join(name);
                if config_path.exists() {
                    if let Ok(config) = StorefrontConfig::load(config_path.to_str()?) {
                        return Some((config, config_path));
                    }
                }
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Open the configured store backend.
    pub async fn open_store(&self) -> Result<Arc<dyn Store>> {
        let store = &self.config.store;
        match store.backend {
            StoreBackend::Memory => {
                self.output
                    .debug("Using the in-memory store; data is lost on exit");
                Ok(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Sqlite => {
                self.output.debug(&format!(
                    "Opening {} ({} connection(s))",
                    store.url, store.max_connections
                ));
                let sqlite = SqliteStore::connect(&store.url, store.max_connections)
                    .await
                    .with_context(|| format!("Failed to open store: {}", store.url))?;
                Ok(Arc::new(sqlite))
            }
        }
    }

    /// Wire every service to the configured store.
    pub async fn storefront(&self) -> Result<Storefront> {
        self.storefront_with(self.config.settings()?).await
    }

    /// Like [`Context::storefront`] with adjusted settings.
    pub async fn storefront_with(&self, settings: StorefrontSettings) -> Result<Storefront> {
        let store = self.open_store().await?;
        Ok(Storefront::new(
            store.clone(),
            Collaborators::local(store),
            settings,
        ))
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        if PathBuf::from(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.cwd.join(path)
        }
    }
}
