//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target service address (`host:port`)
    pub host: String,

    /// Model/version selector on the service
    pub deployment_id: String,

    /// Billing/tracking tag sent with every request
    pub affiliate: String,

    /// Quench the response stream after this long without a response
    /// while input is still flowing (0 disables the deadline)
    pub timeout_ms: u64,

    /// Transport keepalive cadence in milliseconds
    pub keepalive_interval_ms: u64,

    /// Transport message size ceiling in bytes
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost:443".to_string(),
            deployment_id: "default".to_string(),
            affiliate: "default".to_string(),
            timeout_ms: 120_000,
            keepalive_interval_ms: 60_000,
            max_message_size: 64 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    /// Response deadline, or `None` when disabled.
    pub fn response_timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Strategy used to assign correlation IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationStrategy {
    /// Content hash (deterministic)
    #[default]
    Hash,
    /// Random 128-bit identifier
    Random,
}

/// Pipeline stage selection and batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run images through the resizer
    pub resize_images: bool,

    /// Run images through the compressor
    pub compress_images: bool,

    /// Maximum inputs per request
    pub batch_size: usize,

    /// Flush a partial batch this long after its first item arrived
    pub batch_timeout_ms: u64,

    /// How correlation IDs are assigned
    pub correlation: CorrelationStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resize_images: false,
            compress_images: true,
            batch_size: 10,
            batch_timeout_ms: 100,
            correlation: CorrelationStrategy::Hash,
        }
    }
}

/// Resampling filter used when resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingAlgorithm {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Gaussian,
    Lanczos,
}

impl ResamplingAlgorithm {
    pub fn filter(self) -> image::imageops::FilterType {
        use image::imageops::FilterType;
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Image resizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeConfig {
    /// Target width in pixels
    pub width: u32,

    /// Target height in pixels
    pub height: u32,

    /// Scale to fit inside the target instead of stretching to it
    pub maintain_aspect_ratio: bool,

    /// Resampling filter
    pub resampling: ResamplingAlgorithm,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            width: 448,
            height: 448,
            maintain_aspect_ratio: true,
            resampling: ResamplingAlgorithm::Bilinear,
        }
    }
}

/// Brotli compressor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Brotli quality level (0-11)
    pub quality: u32,

    /// Brotli window size as log2 of bytes (10-24)
    pub window_size: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            quality: 11,
            window_size: 22,
        }
    }
}

/// OAuth client-credentials settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client ID (supports `${ENV_VAR}`)
    pub client_id: String,

    /// OAuth client secret (supports `${ENV_VAR}`)
    pub client_secret: String,

    /// Token endpoint
    pub auth_url: String,

    /// Token audience
    pub audience: String,

    /// Tokens this close to expiry are refreshed instead of served
    pub refresh_margin_secs: u64,

    /// Pre-issued access token; bypasses the OAuth flow when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: "${ATHENA_CLIENT_ID}".to_string(),
            client_secret: "${ATHENA_CLIENT_SECRET}".to_string(),
            auth_url: "https://crispthinking.auth0.com/oauth/token".to_string(),
            audience: "crisp-athena-live".to_string(),
            refresh_margin_secs: 30,
            static_token: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
