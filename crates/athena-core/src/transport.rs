//! Seam to the RPC layer that actually talks to the service.
//!
//! The client does not ship a wire implementation; callers inject a
//! [`ClassifierTransport`] built on whatever RPC stack they use, configured
//! from [`ChannelOptions`].

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ConfigError, TransportError};
use crate::types::{ClassificationInput, ClassificationOutput, ClassifyResponse, WireRequest};

/// Requests flowing to the service, already batched and encoded.
pub type RequestStream = BoxStream<'static, WireRequest>;

/// Responses flowing back. A transport error ends the call.
pub type ResponseStream = BoxStream<'static, Result<ClassifyResponse, TransportError>>;

/// Per-call metadata.
#[derive(Clone)]
pub struct CallOptions {
    /// Value for the `authorization` metadata entry
    pub authorization: String,
    /// Deadline for a unary call; streaming calls are bounded by the
    /// client's quench timer instead
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("authorization", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A bidirectional streaming classify call.
#[async_trait]
pub trait ClassifierTransport: Send + Sync {
    /// Open a call that consumes `requests` and yields responses.
    ///
    /// The transport pulls from `requests` at its own pace; that pull is
    /// what drives the image pipeline.
    async fn classify(
        &self,
        requests: RequestStream,
        call: CallOptions,
    ) -> Result<ResponseStream, TransportError>;

    /// Classify one input in a unary call.
    async fn classify_single(
        &self,
        input: ClassificationInput,
        call: CallOptions,
    ) -> Result<ClassificationOutput, TransportError>;
}

/// Connection settings for building a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    pub host: String,
    pub keepalive_interval: Duration,
    pub max_message_size: usize,
    /// How long to wait for a response while input is still flowing
    pub response_timeout: Option<Duration>,
}

impl ChannelOptions {
    /// Derive channel options, rejecting an unusable host before any
    /// network activity.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let host = validate_host(&config.host)?;
        Ok(Self {
            host,
            keepalive_interval: Duration::from_millis(config.keepalive_interval_ms),
            max_message_size: config.max_message_size,
            response_timeout: config.response_timeout(),
        })
    }
}

fn validate_host(host: &str) -> Result<String, ConfigError> {
    let trimmed = host.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidHost(host.to_string()));
    }
    if let Some((_, port)) = trimmed.rsplit_once(':') {
        if !trimmed.ends_with(']') && port.parse::<u16>().is_err() {
            return Err(ConfigError::InvalidHost(host.to_string()));
        }
    }
    Ok(trimmed.to_string())
}
