//! Bot configuration.
//!
//! ## Sources (in precedence order)
//!
//! 1. Command-line flags
//! 2. `--config <path>`, or `<platform config dir>/config.yml` when present
//! 3. Built-in defaults
//!
//! ```yaml
//! catalog:
//!   base_url: https://api.scryfall.com
//!   timeout_seconds: 30
//!   max_pages: 10
//! store:
//!   data_dir: /var/lib/mtg-spoiler-bot
//! dispatch:
//!   interval_ms: 1000
//!   order: spoil
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::DeliveryOrder;
use crate::error::SpoilerError;

const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub store: StoreConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    /// Upper bound on search result pages followed per run.
    pub max_pages: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.scryfall.com".to_owned(),
            timeout_seconds: 30,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
            max_pages: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub interval_ms: u64,
    pub order: DeliveryOrder,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            order: DeliveryOrder::default(),
        }
    }
}

impl Config {
    /// An explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE)) {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.dispatch.interval_ms == 0 {
            return Err(SpoilerError::Config("dispatch.interval_ms must be at least 1".into()).into());
        }
        if self.catalog.timeout_seconds == 0 {
            return Err(
                SpoilerError::Config("catalog.timeout_seconds must be at least 1".into()).into(),
            );
        }
        Ok(())
    }

    /// Where seen-card records live.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.store.data_dir {
            return Ok(dir.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join("seen"))
            .ok_or_else(|| {
                SpoilerError::Config(
                    "no home directory found; set store.data_dir or --data-dir".into(),
                )
                .into()
            })
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
}
