//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::pipeline::compress::{QUALITY_RANGE, WINDOW_RANGE};

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "client.host must not be empty".into(),
            ));
        }
        if self.client.max_message_size == 0 {
            return Err(ConfigError::ValidationError(
                "client.max_message_size must be > 0".into(),
            ));
        }
        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.batch_size must be > 0".into(),
            ));
        }
        if self.pipeline.batch_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.batch_timeout_ms must be > 0".into(),
            ));
        }
        if self.resize.width == 0 || self.resize.height == 0 {
            return Err(ConfigError::ValidationError(
                "resize.width and resize.height must be > 0".into(),
            ));
        }
        if !QUALITY_RANGE.contains(&self.compression.quality) {
            return Err(ConfigError::ValidationError(format!(
                "compression.quality must be between {} and {}",
                QUALITY_RANGE.start(),
                QUALITY_RANGE.end()
            )));
        }
        if !WINDOW_RANGE.contains(&self.compression.window_size) {
            return Err(ConfigError::ValidationError(format!(
                "compression.window_size must be between {} and {}",
                WINDOW_RANGE.start(),
                WINDOW_RANGE.end()
            )));
        }
        Ok(())
    }
}
