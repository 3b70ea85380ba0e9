//! Conversion of processed images into the service's request shape.
//!
//! Two transforms live here: per image, [`ImageData`] becomes a
//! [`ClassificationInput`] with its correlation ID settled; per sealed batch,
//! the inputs become one [`WireRequest`]. Construction fails fast on missing
//! deployment or affiliate; neither transform fails per item.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{ProcessingResult, ValidationError};
use crate::types::{Batch, ClassificationInput, HashType, ImageData, ImageHash, WireRequest};

use super::correlation::{CorrelationProvider, RandomCorrelationProvider};
use super::transformer::AsyncTransformer;

/// Builds classification inputs and wire requests for one deployment.
pub struct ClassificationInputTransformer {
    deployment_id: String,
    affiliate: String,
    correlation: Arc<dyn CorrelationProvider>,
}

impl ClassificationInputTransformer {
    pub fn new(
        deployment_id: impl Into<String>,
        affiliate: impl Into<String>,
        correlation: Arc<dyn CorrelationProvider>,
    ) -> Result<Self, ValidationError> {
        let deployment_id = deployment_id.into();
        let affiliate = affiliate.into();
        if deployment_id.trim().is_empty() {
            return Err(ValidationError::new(
                "deployment_id",
                "deployment_id cannot be empty",
            ));
        }
        if affiliate.trim().is_empty() {
            return Err(ValidationError::new("affiliate", "affiliate cannot be empty"));
        }
        Ok(Self {
            deployment_id,
            affiliate,
            correlation,
        })
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn affiliate(&self) -> &str {
        &self.affiliate
    }

    /// Settle the correlation ID for an image.
    ///
    /// A pre-assigned ID is kept. Otherwise the provider is asked once; an
    /// empty answer is replaced with a random ID so every input is
    /// addressable.
    fn assign_correlation_id(&self, image: &ImageData) -> String {
        if let Some(existing) = image.correlation_id() {
            return existing.to_string();
        }
        let id = self.correlation.correlation_id(&image.content);
        if id.is_empty() {
            tracing::warn!("Correlation provider returned an empty ID, using a random one");
            return RandomCorrelationProvider.correlation_id(&image.content);
        }
        id
    }

    /// Assemble a request from already-built inputs, keeping their order.
    pub fn build_request(&self, inputs: Vec<ClassificationInput>) -> WireRequest {
        let correlation_id = inputs
            .first()
            .map(|input| input.correlation_id.clone())
            .unwrap_or_default();
        WireRequest {
            deployment_id: self.deployment_id.clone(),
            affiliate: self.affiliate.clone(),
            correlation_id,
            inputs,
        }
    }
}

#[async_trait]
impl AsyncTransformer<ImageData, ClassificationInput> for ClassificationInputTransformer {
    fn name(&self) -> &'static str {
        "classification_input"
    }

    async fn transform(&self, input: ImageData) -> ProcessingResult<ClassificationInput> {
        let correlation_id = self.assign_correlation_id(&input);
        let hashes = input
            .md5_hashes()
            .iter()
            .map(|value| ImageHash {
                hash_type: HashType::Md5,
                value: value.clone(),
            })
            .collect();
        Ok(ClassificationInput {
            affiliate: self.affiliate.clone(),
            correlation_id,
            data: input.content,
            encoding: input.encoding,
            format: input.format,
            hashes,
        })
    }
}

#[async_trait]
impl AsyncTransformer<Batch<ClassificationInput>, WireRequest> for ClassificationInputTransformer {
    fn name(&self) -> &'static str {
        "wire_request"
    }

    async fn transform(&self, input: Batch<ClassificationInput>) -> ProcessingResult<WireRequest> {
        tracing::debug!(
            "Sealing request with {} input(s), accumulated for {:?}",
            input.len(),
            input.created_at().elapsed()
        );
        Ok(self.build_request(input.into_items()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::correlation::HashCorrelationProvider;
    use crate::types::{ImageFormat, RequestEncoding};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn md5_of(bytes: &[u8]) -> String {
        format!("{:x}", md5::compute(bytes))
    }

    fn transformer() -> ClassificationInputTransformer {
        ClassificationInputTransformer::new("deploy-1", "aff-1", Arc::new(HashCorrelationProvider))
            .unwrap()
    }

    #[test]
    fn test_empty_deployment_rejected() {
        let err = ClassificationInputTransformer::new("", "aff", Arc::new(HashCorrelationProvider))
            .err()
            .unwrap();
        assert_eq!(err.field, "deployment_id");
    }

    #[test]
    fn test_empty_affiliate_rejected() {
        let err =
            ClassificationInputTransformer::new("deploy", "  ", Arc::new(HashCorrelationProvider))
                .err()
                .unwrap();
        assert_eq!(err.field, "affiliate");
    }

    #[tokio::test]
    async fn test_assigns_hash_correlation_id() {
        let image = ImageData::new(b"\x89PNG\r\n\x1a\nbody".to_vec());
        let expected = HashCorrelationProvider::content_hash(&image.content);
        let input: ClassificationInput = transformer().transform(image).await.unwrap();

        assert_eq!(input.correlation_id, expected);
        assert_eq!(input.affiliate, "aff-1");
        assert_eq!(input.format, ImageFormat::Png);
        assert_eq!(input.encoding, RequestEncoding::Uncompressed);
        assert_eq!(input.hashes.len(), 1);
        assert_eq!(input.hashes[0].hash_type, HashType::Md5);
        assert_eq!(input.hashes[0].value, md5_of(b"\x89PNG\r\n\x1a\nbody"));
    }

    #[tokio::test]
    async fn test_existing_correlation_id_is_kept() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = move |_: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
            "fresh".to_string()
        };
        let transformer =
            ClassificationInputTransformer::new("deploy", "aff", Arc::new(provider)).unwrap();

        let image = ImageData::new(vec![1, 2, 3]).with_correlation_id("mine");
        let input: ClassificationInput = transformer.transform(image).await.unwrap();
        assert_eq!(input.correlation_id, "mine");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let input: ClassificationInput =
            transformer.transform(ImageData::new(vec![4])).await.unwrap();
        assert_eq!(input.correlation_id, "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_provider_answer_replaced() {
        let transformer =
            ClassificationInputTransformer::new("deploy", "aff", Arc::new(|_: &[u8]| String::new()))
                .unwrap();
        let input: ClassificationInput =
            transformer.transform(ImageData::new(vec![1])).await.unwrap();
        assert!(!input.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn test_batch_becomes_one_request() {
        let transformer = transformer();
        let mut inputs = Vec::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let image = ImageData::new(vec![i as u8]).with_correlation_id(*id);
            let input: ClassificationInput = transformer.transform(image).await.unwrap();
            inputs.push(input);
        }

        let request: WireRequest = transformer
            .transform(Batch::new(inputs, Instant::now()))
            .await
            .unwrap();
        assert_eq!(request.deployment_id, "deploy-1");
        assert_eq!(request.affiliate, "aff-1");
        assert_eq!(request.correlation_id, "a");
        let ids: Vec<_> = request.inputs.iter().map(|i| i.correlation_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
