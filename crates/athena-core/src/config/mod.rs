//! Configuration management for the Athena client.
//!
//! Configuration is loaded from a TOML file in the platform config directory
//! with sensible defaults. Every section implements `Default`, so a partial
//! file only needs to name the values it changes.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service connection settings
    pub client: ClientConfig,

    /// Stage selection and batching
    pub pipeline: PipelineConfig,

    /// Resizer settings
    pub resize: ResizeConfig,

    /// Compressor settings
    pub compression: CompressionConfig,

    /// OAuth settings
    pub auth: AuthConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.athena.athena/config.toml
    /// - Linux: ~/.config/athena/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\athena\config\config.toml
    ///
    /// Falls back to ~/.athena/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "athena", "athena")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".athena").join("config.toml")
            })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Batcher flush timeout as a `Duration`.
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.pipeline.batch_timeout_ms)
    }
}

/// Resolve `${ENV_VAR}` references in secret-bearing config strings.
///
/// Returns `None` when the value is empty or references an unset variable.
pub fn resolve_secret(value: &str) -> Option<String> {
    let expanded = shellexpand::env(value).ok()?;
    if expanded.is_empty() {
        None
    } else {
        Some(expanded.into_owned())
    }
}
