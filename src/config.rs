//! Application configuration loading and discovery.
//!
//! Configuration hierarchy:
//! 1. Explicit `--config` path
//! 2. `./toolforge.toml` in the current directory
//! 3. Built-in defaults

use crate::env;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory under which per-instance volume directories are created
    pub data_root: PathBuf,
    /// Root directory containing the per-tool Docker build contexts
    pub build_context_root: PathBuf,
    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            build_context_root: PathBuf::from("."),
            log_filter: "toolforge=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Discover and load configuration.
    ///
    /// An explicit path is required to exist; otherwise `./toolforge.toml` is
    /// used when present, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path is missing or any found file fails
    /// to parse.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            info!("Loading configuration from {:?}", path);
            return Self::from_toml_file(path);
        }

        let candidate = PathBuf::from(env::CONFIG_FILE_NAME);
        if candidate.is_file() {
            info!("Loading configuration from {:?}", candidate);
            return Self::from_toml_file(&candidate);
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }
}
