//! Image preparation pipeline.
//!
//! Stages, in default wiring order:
//! - **resize**: fit images to the service's input size (optional)
//! - **compress**: Brotli-encode the payload (optional)
//! - **classification_input**: settle correlation IDs, build request inputs
//! - **batcher**: group inputs by size and time
//! - **classification_input** again: seal each batch into a wire request
//!
//! Every stage is a pull-based `Stream`; see [`transformer`] for the protocol.

pub mod batcher;
pub mod classification_input;
pub mod compress;
pub mod correlation;
pub mod resize;
pub mod transformer;

pub use batcher::RequestBatcher;
pub use classification_input::ClassificationInputTransformer;
pub use compress::{decompress, Compressor};
pub use correlation::{
    provider_for, CorrelationProvider, HashCorrelationProvider, RandomCorrelationProvider,
};
pub use resize::ImageResizer;
pub use transformer::{image_source, AsyncTransformer, ItemStream, TransformExt, TransformStage};

use futures_util::stream::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ProcessingResult, ValidationError};
use crate::types::{ClassificationInput, ImageData, WireRequest};

/// A fully validated set of stages, ready to run over any number of image
/// streams.
pub struct Pipeline {
    resizer: Option<Arc<ImageResizer>>,
    compressor: Option<Arc<Compressor>>,
    input: Arc<ClassificationInputTransformer>,
    batch_size: usize,
    batch_timeout: Duration,
}

impl Pipeline {
    /// Build the pipeline described by `config`, with the configured
    /// correlation strategy.
    pub fn from_config(config: &Config) -> Result<Self, ValidationError> {
        Self::new(config, provider_for(config.pipeline.correlation))
    }

    /// Build the pipeline with a caller-supplied correlation provider.
    ///
    /// All stage settings are validated here, before any image is read.
    pub fn new(
        config: &Config,
        correlation: Arc<dyn CorrelationProvider>,
    ) -> Result<Self, ValidationError> {
        let resizer = if config.pipeline.resize_images {
            Some(Arc::new(ImageResizer::new(config.resize.clone())?))
        } else {
            None
        };
        let compressor = if config.pipeline.compress_images {
            Some(Arc::new(Compressor::new(&config.compression)?))
        } else {
            None
        };
        let input = Arc::new(ClassificationInputTransformer::new(
            config.client.deployment_id.clone(),
            config.client.affiliate.clone(),
            correlation,
        )?);

        let batch_size = config.pipeline.batch_size;
        let batch_timeout = config.batch_timeout();
        RequestBatcher::<ClassificationInput>::check_settings(batch_size, batch_timeout)?;

        tracing::debug!(
            "Pipeline ready: resize={}, compress={}, batch_size={}, batch_timeout={:?}",
            resizer.is_some(),
            compressor.is_some(),
            batch_size,
            batch_timeout
        );

        Ok(Self {
            resizer,
            compressor,
            input,
            batch_size,
            batch_timeout,
        })
    }

    /// Thread `images` through every enabled stage.
    ///
    /// The result is lazy: nothing is read from `images` until the returned
    /// stream is polled. Items that fail a stage appear in place as `Err`.
    pub fn run<S>(&self, images: S) -> ItemStream<WireRequest>
    where
        S: Stream<Item = ImageData> + Send + 'static,
    {
        let mut prepared = image_source(images);
        if let Some(resizer) = &self.resizer {
            prepared = prepared.pipe(Arc::clone(resizer)).boxed();
        }
        if let Some(compressor) = &self.compressor {
            prepared = prepared.pipe(Arc::clone(compressor)).boxed();
        }

        let inputs: ItemStream<ClassificationInput> =
            prepared.pipe(Arc::clone(&self.input)).boxed();
        RequestBatcher::with_checked_settings(inputs, self.batch_size, self.batch_timeout)
            .pipe(Arc::clone(&self.input))
            .boxed()
    }

    /// Run one image through the per-image stages, skipping the batcher.
    pub async fn prepare_single(&self, image: ImageData) -> ProcessingResult<ClassificationInput> {
        let mut image = image;
        if let Some(resizer) = &self.resizer {
            image = resizer.transform(image).await?;
        }
        if let Some(compressor) = &self.compressor {
            image = compressor.transform(image).await?;
        }
        AsyncTransformer::<ImageData, ClassificationInput>::transform(self.input.as_ref(), image).await
    }
}
