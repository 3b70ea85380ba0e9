//! Core data types flowing through the Athena client.
//!
//! Images enter as [`ImageData`], leave the pipeline as [`WireRequest`]s and
//! come back from the service as [`ClassifyResponse`]s.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::time::Instant;

use crate::error::ClassificationOutputError;

/// Image container format, detected from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
    Tiff,
    /// Unrecognized or empty content
    Unspecified,
}

impl ImageFormat {
    /// Detect the format of raw image bytes from their magic numbers.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(b"\x89PNG") {
            Self::Png
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Self::Gif
        } else if data.starts_with(b"BM") {
            Self::Bmp
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Self::Webp
        } else if data.starts_with(b"II*\x00") || data.starts_with(b"MM\x00*") {
            Self::Tiff
        } else {
            Self::Unspecified
        }
    }

    /// The matching codec in the `image` crate, if any.
    pub(crate) fn to_image_format(self) -> Option<image::ImageFormat> {
        match self {
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::Png => Some(image::ImageFormat::Png),
            Self::Gif => Some(image::ImageFormat::Gif),
            Self::Bmp => Some(image::ImageFormat::Bmp),
            Self::Webp => Some(image::ImageFormat::WebP),
            Self::Tiff => Some(image::ImageFormat::Tiff),
            Self::Unspecified => None,
        }
    }

    pub fn from_image_format(format: image::ImageFormat) -> Self {
        match format {
            image::ImageFormat::Jpeg => Self::Jpeg,
            image::ImageFormat::Png => Self::Png,
            image::ImageFormat::Gif => Self::Gif,
            image::ImageFormat::Bmp => Self::Bmp,
            image::ImageFormat::WebP => Self::Webp,
            image::ImageFormat::Tiff => Self::Tiff,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

/// Transport-level encoding applied to image content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestEncoding {
    #[default]
    Uncompressed,
    Brotli,
}

/// An image travelling through the pipeline.
///
/// Each stage takes ownership of the value and hands a new one downstream.
/// The correlation ID, once set, is carried unchanged through every stage.
///
/// The hash lists record the pixel content at creation and after every
/// transformation that changes it, oldest first. Transport encoding does
/// not count as a transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Image bytes (possibly compressed, see `encoding`)
    pub content: Vec<u8>,
    /// Pixel container format of the content
    pub format: ImageFormat,
    /// Transport encoding applied on top of the format
    pub encoding: RequestEncoding,
    correlation_id: Option<String>,
    sha256_hashes: Vec<String>,
    md5_hashes: Vec<String>,
}

impl ImageData {
    /// Wrap raw image bytes, detecting the format from content.
    pub fn new(content: Vec<u8>) -> Self {
        let format = ImageFormat::detect(&content);
        Self {
            sha256_hashes: vec![sha256_hex(&content)],
            md5_hashes: vec![md5_hex(&content)],
            content,
            format,
            encoding: RequestEncoding::Uncompressed,
            correlation_id: None,
        }
    }

    /// Pre-assign a correlation ID; the pipeline will keep it as-is.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// SHA-256 of the content at creation and after each transformation.
    pub fn sha256_hashes(&self) -> &[String] {
        &self.sha256_hashes
    }

    /// MD5 of the content at creation and after each transformation.
    pub fn md5_hashes(&self) -> &[String] {
        &self.md5_hashes
    }

    /// Replace the content with a re-encoding of the same pixels.
    ///
    /// Correlation and the hash history are kept as they are.
    pub(crate) fn with_content(self, content: Vec<u8>) -> Self {
        Self { content, ..self }
    }

    /// Replace the content with transformed pixels and record their hashes.
    pub(crate) fn with_transformed_content(mut self, content: Vec<u8>) -> Self {
        self.sha256_hashes.push(sha256_hex(&content));
        self.md5_hashes.push(md5_hex(&content));
        Self { content, ..self }
    }

    /// Short human-readable label used in errors and logs.
    pub fn label(&self) -> String {
        match &self.correlation_id {
            Some(id) => id.clone(),
            None => format!("{} image ({} bytes)", self.format, self.content.len()),
        }
    }
}

/// A sealed group of items flushed by the request batcher.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    items: Vec<T>,
    created_at: Instant,
}

impl<T> Batch<T> {
    pub(crate) fn new(items: Vec<T>, created_at: Instant) -> Self {
        Self { items, created_at }
    }

    /// Items in arrival order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// When the first item of the batch was accepted.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

/// Hash algorithms the service accepts for input provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Md5,
    Sha256,
}

/// One recorded content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHash {
    pub hash_type: HashType,
    pub value: String,
}

/// One encoded image payload inside a [`WireRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationInput {
    pub affiliate: String,
    pub correlation_id: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub encoding: RequestEncoding,
    pub format: ImageFormat,
    /// Content hashes, original first, one per transformation after that
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashes: Vec<ImageHash>,
}

/// A request ready to be streamed to the classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub deployment_id: String,
    pub affiliate: String,
    /// Correlation ID of the first input
    pub correlation_id: String,
    pub inputs: Vec<ClassificationInput>,
}

/// Error codes the service attaches to failed outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    Unspecified,
    ImageTooLarge,
    ModelError,
    UnsupportedFormat,
    InvalidInput,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "unspecified",
            Self::ImageTooLarge => "image_too_large",
            Self::ModelError => "model_error",
            Self::UnsupportedFormat => "unsupported_format",
            Self::InvalidInput => "invalid_input",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A single label with its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub weight: f32,
}

/// Error attached to one classification output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// The service's verdict for one input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationOutput {
    pub correlation_id: String,
    pub classifications: Vec<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutputError>,
}

impl ClassificationOutput {
    /// The output's error, if it carries one with a non-empty message.
    pub fn failure(&self) -> Option<ClassificationOutputError> {
        let error = self.error.as_ref().filter(|e| !e.message.is_empty())?;
        Some(ClassificationOutputError {
            correlation_id: self.correlation_id.clone(),
            code: error.code,
            message: error.message.clone(),
            details: error.details.clone(),
        })
    }

    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }
}

/// Stream-wide error reported by the service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceError {
    pub message: String,
}

/// One response from the classification stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassifyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_error: Option<ServiceError>,
    pub outputs: Vec<ClassificationOutput>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_formats() {
        assert_eq!(ImageFormat::detect(b"\x89PNG\r\n\x1a\n"), ImageFormat::Png);
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::detect(b"GIF89a..."), ImageFormat::Gif);
        assert_eq!(ImageFormat::detect(b"BM\x00\x00"), ImageFormat::Bmp);
        assert_eq!(ImageFormat::detect(b"RIFF\x00\x00\x00\x00WEBPVP8 "), ImageFormat::Webp);
        assert_eq!(ImageFormat::detect(b"II*\x00\x08"), ImageFormat::Tiff);
        assert_eq!(ImageFormat::detect(b""), ImageFormat::Unspecified);
        assert_eq!(ImageFormat::detect(b"hello world"), ImageFormat::Unspecified);
    }

    #[test]
    fn test_webp_needs_full_header() {
        assert_eq!(ImageFormat::detect(b"RIFF\x00\x00"), ImageFormat::Unspecified);
    }

    #[test]
    fn test_image_data_keeps_correlation_across_content_change() {
        let image = ImageData::new(vec![1, 2, 3]).with_correlation_id("abc");
        let replaced = image.with_content(vec![9]);
        assert_eq!(replaced.correlation_id(), Some("abc"));
        assert_eq!(replaced.content, vec![9]);
    }

    #[test]
    fn test_new_image_records_original_hashes() {
        let image = ImageData::new(b"hello".to_vec());
        assert_eq!(image.md5_hashes(), ["5d41402abc4b2a76b9719d911017c592"]);
        assert_eq!(
            image.sha256_hashes(),
            ["2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"]
        );
    }

    #[test]
    fn test_transformation_appends_hashes_reencoding_does_not() {
        let image = ImageData::new(b"hello".to_vec());
        let original = image.md5_hashes()[0].clone();

        let transformed = image.with_transformed_content(b"world".to_vec());
        assert_eq!(
            transformed.md5_hashes(),
            [original.clone(), "7d793037a0760186574b0282f2f435e7".to_string()]
        );
        assert_eq!(transformed.sha256_hashes().len(), 2);

        let encoded = transformed.with_content(vec![0; 4]);
        assert_eq!(encoded.md5_hashes().len(), 2);
        assert_eq!(encoded.md5_hashes()[0], original);
    }

    #[test]
    fn test_label_without_correlation() {
        let image = ImageData::new(vec![0; 10]);
        assert_eq!(image.label(), "unspecified image (10 bytes)");
    }

    #[test]
    fn test_output_failure_requires_message() {
        let mut output = ClassificationOutput {
            correlation_id: "c1".to_string(),
            classifications: vec![],
            error: Some(OutputError {
                code: ErrorCode::ModelError,
                message: String::new(),
                details: None,
            }),
        };
        assert!(output.is_success());

        output.error.as_mut().unwrap().message = "boom".to_string();
        let failure = output.failure().unwrap();
        assert_eq!(failure.correlation_id, "c1");
        assert_eq!(failure.code, ErrorCode::ModelError);
    }

    #[test]
    fn test_classification_input_serializes_base64() {
        let input = ClassificationInput {
            affiliate: "aff".to_string(),
            correlation_id: "c".to_string(),
            data: vec![0, 1, 2],
            encoding: RequestEncoding::Brotli,
            format: ImageFormat::Png,
            hashes: vec![ImageHash {
                hash_type: HashType::Md5,
                value: "abc".to_string(),
            }],
        };
        let json = serde_json::to_string(&input).unwrap();
        assert!(json.contains("\"data\":\"AAEC\""));
        assert!(json.contains("\"encoding\":\"brotli\""));
        assert!(json.contains("\"hash_type\":\"md5\""));
        let back: ClassificationInput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, input);
    }
}
