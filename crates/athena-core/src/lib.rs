//! Athena Core - client library for the Athena image classification service.
//!
//! Images are prepared by a lazy, pull-based pipeline and streamed to the
//! service through an injected transport, authenticated by a shared
//! credential cache.
//!
//! # Architecture
//!
//! ```text
//! images → Resize → Compress → ClassificationInput → Batch → WireRequest → transport
//!                                                                             ↓
//!                                           ClassifyEvent stream ← responses ←┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use athena_core::{AthenaClient, ClassifyEvent, Config, CredentialCache, ImageData};
//! use futures_util::{stream, StreamExt};
//! use std::sync::Arc;
//!
//! async fn run(transport: Arc<dyn athena_core::ClassifierTransport>) -> athena_core::Result<()> {
//!     let config = Config::load()?;
//!     let credentials = Arc::new(CredentialCache::from_config(&config.auth)?);
//!     let client = AthenaClient::new(&config, credentials, transport)?;
//!
//!     let images = stream::iter(vec![ImageData::new(std::fs::read("cat.jpg")?)]);
//!     let mut events = client.classify_images(images).await?;
//!     while let Some(event) = events.next().await {
//!         if let ClassifyEvent::Response(response) = event? {
//!             for output in athena_core::successful_outputs(&response) {
//!                 println!("{}: {:?}", output.correlation_id, output.classifications);
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod outputs;
pub mod pipeline;
pub mod transport;
pub mod types;

pub use auth::{AccessToken, CredentialCache, OAuthTokenSource, StaticTokenSource, TokenSource};
pub use client::{AthenaClient, ClassifyEvent, EventStream};
pub use config::Config;
pub use error::{
    AthenaError, ClassificationOutputError, ConfigError, CredentialError, ProcessingError,
    ProcessingErrorKind, ProcessingResult, Result, TransportError, ValidationError,
};
pub use output::{OutputFormat, OutputWriter, RequestSummary};
pub use outputs::{
    has_output_errors, log_output_errors, output_error_summary, process_outputs,
    successful_outputs,
};
pub use pipeline::{
    AsyncTransformer, ClassificationInputTransformer, Compressor, CorrelationProvider,
    HashCorrelationProvider, ImageResizer, Pipeline, RandomCorrelationProvider, RequestBatcher,
};
pub use transport::{CallOptions, ChannelOptions, ClassifierTransport};
pub use types::{
    Batch, Classification, ClassificationInput, ClassificationOutput, ClassifyResponse, ErrorCode,
    HashType, ImageData, ImageFormat, ImageHash, RequestEncoding, WireRequest,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
