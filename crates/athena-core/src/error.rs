//! Error types for the Athena client.
//!
//! Errors are organized by how far they reach: item-scoped pipeline failures
//! travel alongside the failing item, configuration and validation failures
//! abort before any I/O, and credential failures abort the in-flight call
//! while leaving the credential cache usable.

use std::fmt;

use thiserror::Error;

use crate::types::ErrorCode;

/// Top-level error type for Athena client operations.
#[derive(Error, Debug)]
pub enum AthenaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A pipeline stage was constructed with invalid settings
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Access token acquisition failed
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The RPC transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An image could not be prepared for a single-image call
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// A classification output carried an error
    #[error(transparent)]
    Output(#[from] ClassificationOutputError),

    /// The service reported a stream-wide error
    #[error("Service error: {0}")]
    Service(String),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// The service host is unusable; raised before any network activity
    #[error("Invalid host: {0:?}")]
    InvalidHost(String),
}

/// A pipeline stage rejected its configuration at construction time.
///
/// Stream-fatal: a stage that fails validation never processes an item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Name of the offending setting
    pub field: &'static str,
    /// What is wrong with it
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Item-scoped pipeline failures.
///
/// A stage that produces one of these reports it in place of the failing
/// item and keeps processing the rest of the stream.
#[derive(Error, Debug, Clone)]
pub enum ProcessingError {
    /// The bytes are not a decodable image of a supported format
    #[error("Decode failed for {item}: {message}")]
    Decode { item: String, message: String },

    /// The resized image could not be re-encoded in its source format
    #[error("Encode failed for {item}: {message}")]
    Encode { item: String, message: String },

    /// The compression codec reported an internal error
    #[error("Compression failed for {item}: {message}")]
    Compression { item: String, message: String },
}

/// Discriminant of a [`ProcessingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingErrorKind {
    DecodeFailure,
    EncodeFailure,
    CompressionFailure,
}

impl ProcessingError {
    pub fn kind(&self) -> ProcessingErrorKind {
        match self {
            Self::Decode { .. } => ProcessingErrorKind::DecodeFailure,
            Self::Encode { .. } => ProcessingErrorKind::EncodeFailure,
            Self::Compression { .. } => ProcessingErrorKind::CompressionFailure,
        }
    }

    /// Label of the item that failed.
    pub fn item(&self) -> &str {
        match self {
            Self::Decode { item, .. }
            | Self::Encode { item, .. }
            | Self::Compression { item, .. } => item,
        }
    }
}

/// Access token acquisition failures.
///
/// `Clone` because one refresh result is delivered to every caller waiting
/// on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Client id or secret missing
    #[error("Missing credentials: {0} cannot be empty")]
    MissingCredentials(&'static str),

    /// The token endpoint could not be reached
    #[error("Failed to connect to OAuth server: {0}")]
    Http(String),

    /// The token endpoint answered with a non-success status
    #[error("OAuth request failed with status {status}{}", detail_suffix(.message))]
    Rejected { status: u16, message: Option<String> },

    /// The token endpoint answered with an unusable body
    #[error("Invalid OAuth response format: {0}")]
    InvalidResponse(String),

    /// The token is already inside its refresh margin and cannot be served
    #[error("Access token expired or expiring within the refresh margin")]
    TokenExpired,
}

fn detail_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!(": {m}"),
        _ => String::new(),
    }
}

/// Failure reported by the external RPC transport.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A per-output failure returned by the service.
///
/// Not a client-side fault: the service processed the request but could not
/// classify this particular input.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct ClassificationOutputError {
    pub correlation_id: String,
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl fmt::Display for ClassificationOutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Classification failed for {} ({}): {}",
            self.correlation_id, self.code, self.message
        )?;
        if let Some(details) = self.details.as_deref().filter(|d| !d.is_empty()) {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

/// Convenience type alias for Athena results.
pub type Result<T> = std::result::Result<T, AthenaError>;

/// Convenience type alias for item-scoped pipeline results.
pub type ProcessingResult<T> = std::result::Result<T, ProcessingError>;
