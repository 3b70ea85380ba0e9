//! Image resizing to the dimensions the service expects.
//!
//! Failures are item-scoped: an undecodable image is reported in place of
//! the item and the stream carries on.

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;

use crate::config::ResizeConfig;
use crate::error::{ProcessingError, ProcessingResult, ValidationError};
use crate::types::{ImageData, ImageFormat};

use super::transformer::AsyncTransformer;

/// Resizes images to a configured target size, keeping their format.
pub struct ImageResizer {
    config: ResizeConfig,
}

impl ImageResizer {
    /// Create a resizer, rejecting a zero-sized target.
    pub fn new(config: ResizeConfig) -> Result<Self, ValidationError> {
        if config.width == 0 || config.height == 0 {
            return Err(ValidationError::new(
                "resize",
                format!(
                    "target size must be non-zero, got {}x{}",
                    config.width, config.height
                ),
            ));
        }
        Ok(Self { config })
    }

    /// Output dimensions for a source image of the given size.
    ///
    /// With `maintain_aspect_ratio`, the image is scaled by
    /// `min(W / width, H / height)` so it fits inside the target without
    /// padding; otherwise it is stretched to exactly `(W, H)`.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let (target_w, target_h) = (self.config.width, self.config.height);
        if !self.config.maintain_aspect_ratio || width == 0 || height == 0 {
            return (target_w, target_h);
        }

        let scale = f64::min(
            target_w as f64 / width as f64,
            target_h as f64 / height as f64,
        );
        let scaled_w = ((width as f64 * scale).round() as u32).clamp(1, target_w);
        let scaled_h = ((height as f64 * scale).round() as u32).clamp(1, target_h);
        (scaled_w, scaled_h)
    }

    /// Decode, resize and re-encode one image (runs in spawn_blocking).
    fn resize_sync(&self, data: ImageData) -> ProcessingResult<ImageData> {
        let item = data.label();
        let mut reader = image::ImageReader::new(Cursor::new(&data.content));
        match data.format.to_image_format() {
            Some(format) => reader.set_format(format),
            None => {
                reader = reader.with_guessed_format().map_err(|e| ProcessingError::Decode {
                    item: item.clone(),
                    message: format!("Cannot detect image format: {}", e),
                })?
            }
        }
        let source_format = reader.format().ok_or_else(|| ProcessingError::Decode {
            item: item.clone(),
            message: "Unsupported image format".to_string(),
        })?;
        let image = reader.decode().map_err(|e| ProcessingError::Decode {
            item: item.clone(),
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        let (target_w, target_h) = self.target_dimensions(width, height);
        if (width, height) == (target_w, target_h) {
            tracing::trace!("{item} already {width}x{height}, skipping resize");
            return Ok(data);
        }

        let resized = image.resize_exact(target_w, target_h, self.config.resampling.filter());
        let resized = match source_format {
            // JPEG cannot carry an alpha channel
            image::ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
            _ => resized,
        };

        let mut buffer = Cursor::new(Vec::new());
        resized
            .write_to(&mut buffer, source_format)
            .map_err(|e| ProcessingError::Encode {
                item: item.clone(),
                message: e.to_string(),
            })?;

        tracing::trace!("Resized {item}: {width}x{height} -> {target_w}x{target_h}");
        let mut resized = data.with_transformed_content(buffer.into_inner());
        resized.format = ImageFormat::from_image_format(source_format);
        Ok(resized)
    }
}

#[async_trait]
impl AsyncTransformer<ImageData, ImageData> for ImageResizer {
    fn name(&self) -> &'static str {
        "resize"
    }

    async fn transform(&self, input: ImageData) -> ProcessingResult<ImageData> {
        let resizer = Self {
            config: self.config.clone(),
        };
        let item = input.label();
        tokio::task::spawn_blocking(move || resizer.resize_sync(input))
            .await
            .map_err(|e| ProcessingError::Decode {
                item,
                message: format!("Task join error: {}", e),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResamplingAlgorithm;
    use crate::error::ProcessingErrorKind;

    fn encode(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn resizer(width: u32, height: u32, maintain_aspect_ratio: bool) -> ImageResizer {
        ImageResizer::new(ResizeConfig {
            width,
            height,
            maintain_aspect_ratio,
            resampling: ResamplingAlgorithm::Bilinear,
        })
        .unwrap()
    }

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        image::load_from_memory(bytes).unwrap().dimensions()
    }

    #[tokio::test]
    async fn test_resize_keeps_aspect_ratio() {
        let input = ImageData::new(encode(200, 100, image::ImageFormat::Png));
        let output = resizer(100, 100, true).transform(input).await.unwrap();
        assert_eq!(dimensions(&output.content), (100, 50));
        assert_eq!(output.format, ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_resize_stretches_without_aspect_ratio() {
        let input = ImageData::new(encode(200, 100, image::ImageFormat::Png));
        let output = resizer(64, 64, false).transform(input).await.unwrap();
        assert_eq!(dimensions(&output.content), (64, 64));
    }

    #[tokio::test]
    async fn test_resize_preserves_jpeg_format() {
        let input = ImageData::new(encode(120, 80, image::ImageFormat::Jpeg));
        assert_eq!(input.format, ImageFormat::Jpeg);
        let output = resizer(60, 60, true).transform(input).await.unwrap();
        assert_eq!(output.format, ImageFormat::Jpeg);
        assert_eq!(ImageFormat::detect(&output.content), ImageFormat::Jpeg);
        assert_eq!(dimensions(&output.content), (60, 40));
    }

    #[tokio::test]
    async fn test_resize_keeps_correlation_id() {
        let input =
            ImageData::new(encode(50, 50, image::ImageFormat::Png)).with_correlation_id("keep-me");
        let output = resizer(10, 10, true).transform(input).await.unwrap();
        assert_eq!(output.correlation_id(), Some("keep-me"));
    }

    #[tokio::test]
    async fn test_already_sized_image_passes_through() {
        let bytes = encode(32, 16, image::ImageFormat::Png);
        let output = resizer(64, 16, true)
            .transform(ImageData::new(bytes.clone()))
            .await
            .unwrap();
        assert_eq!(output.content, bytes);
    }

    #[tokio::test]
    async fn test_resize_appends_content_hashes() {
        let input = ImageData::new(encode(200, 100, image::ImageFormat::Png));
        let original = input.md5_hashes().to_vec();

        let output = resizer(100, 100, true).transform(input).await.unwrap();
        assert_eq!(output.md5_hashes().len(), 2);
        assert_eq!(output.sha256_hashes().len(), 2);
        assert_eq!(output.md5_hashes()[0], original[0]);
        assert_eq!(
            output.md5_hashes()[1],
            ImageData::new(output.content.clone()).md5_hashes()[0]
        );
    }

    #[tokio::test]
    async fn test_pass_through_records_no_transformation() {
        let input = ImageData::new(encode(32, 16, image::ImageFormat::Png));
        let output = resizer(64, 16, true).transform(input).await.unwrap();
        assert_eq!(output.md5_hashes().len(), 1);
    }

    #[tokio::test]
    async fn test_garbage_is_decode_failure() {
        let err = resizer(10, 10, true)
            .transform(ImageData::new(b"definitely not an image".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ProcessingErrorKind::DecodeFailure);
    }

    #[test]
    fn test_aspect_ratio_within_rounding_tolerance() {
        let resizer = resizer(448, 448, true);
        for (w, h) in [(1920, 1080), (1080, 1920), (640, 480), (37, 1000), (3, 2), (5000, 7)] {
            let (tw, th) = resizer.target_dimensions(w, h);
            assert!(tw <= 448 && th <= 448);
            assert!(tw == 448 || th == 448, "{w}x{h} -> {tw}x{th}");
            // One pixel of rounding on the shorter side
            let expected = w as f64 / h as f64;
            let low = (tw as f64 - 0.5).max(0.5) / (th as f64 + 0.5);
            let high = (tw as f64 + 0.5) / (th as f64 - 0.5).max(0.5);
            assert!(
                (low..=high).contains(&expected) || tw == 1 || th == 1,
                "{w}x{h} -> {tw}x{th}"
            );
        }
    }

    #[test]
    fn test_zero_target_rejected() {
        let result = ImageResizer::new(ResizeConfig {
            width: 0,
            ..ResizeConfig::default()
        });
        assert!(result.is_err());
    }
}
