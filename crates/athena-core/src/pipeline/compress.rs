//! Lossless Brotli compression of image payloads.
//!
//! Compression is a transport concern: the pixel format is left untouched
//! and only `encoding` changes. Failures are item-scoped and only arise from
//! codec errors, never from valid input.

use async_trait::async_trait;
use std::io::Read;
use std::ops::RangeInclusive;

use crate::config::CompressionConfig;
use crate::error::{ProcessingError, ProcessingResult, ValidationError};
use crate::types::{ImageData, RequestEncoding};

use super::transformer::AsyncTransformer;

/// Legal Brotli quality levels.
pub const QUALITY_RANGE: RangeInclusive<u32> = 0..=11;

/// Legal Brotli window sizes (log2 of the sliding window in bytes).
pub const WINDOW_RANGE: RangeInclusive<u32> = 10..=24;

const BUFFER_SIZE: usize = 4096;

/// Brotli compressor stage.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    quality: u32,
    window_size: u32,
}

impl Compressor {
    /// Create a compressor, validating the settings against the codec's ranges.
    pub fn new(config: &CompressionConfig) -> Result<Self, ValidationError> {
        if !QUALITY_RANGE.contains(&config.quality) {
            return Err(ValidationError::new(
                "compression.quality",
                format!(
                    "{} is outside {}..={}",
                    config.quality,
                    QUALITY_RANGE.start(),
                    QUALITY_RANGE.end()
                ),
            ));
        }
        if !WINDOW_RANGE.contains(&config.window_size) {
            return Err(ValidationError::new(
                "compression.window_size",
                format!(
                    "{} is outside {}..={}",
                    config.window_size,
                    WINDOW_RANGE.start(),
                    WINDOW_RANGE.end()
                ),
            ));
        }
        Ok(Self {
            quality: config.quality,
            window_size: config.window_size,
        })
    }

    /// Compress a byte slice.
    pub fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut output = Vec::with_capacity(data.len() / 2);
        brotli::CompressorReader::new(data, BUFFER_SIZE, self.quality, self.window_size)
            .read_to_end(&mut output)?;
        Ok(output)
    }

    fn compress_item(self, data: ImageData) -> ProcessingResult<ImageData> {
        let compressed = self
            .compress(&data.content)
            .map_err(|e| ProcessingError::Compression {
                item: data.label(),
                message: e.to_string(),
            })?;
        tracing::trace!(
            "Compressed {}: {} -> {} bytes",
            data.label(),
            data.content.len(),
            compressed.len()
        );
        let mut compressed = data.with_content(compressed);
        compressed.encoding = RequestEncoding::Brotli;
        Ok(compressed)
    }
}

/// Inverse of [`Compressor::compress`].
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut output = Vec::new();
    brotli::Decompressor::new(data, BUFFER_SIZE).read_to_end(&mut output)?;
    Ok(output)
}

#[async_trait]
impl AsyncTransformer<ImageData, ImageData> for Compressor {
    fn name(&self) -> &'static str {
        "compress"
    }

    async fn transform(&self, input: ImageData) -> ProcessingResult<ImageData> {
        if input.encoding == RequestEncoding::Brotli {
            tracing::debug!("{} is already compressed, passing through", input.label());
            return Ok(input);
        }
        let compressor = *self;
        let item = input.label();
        tokio::task::spawn_blocking(move || compressor.compress_item(input))
            .await
            .map_err(|e| ProcessingError::Compression {
                item,
                message: format!("Task join error: {}", e),
            })?
    }
}
