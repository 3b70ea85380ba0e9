//! Correlation ID assignment.
//!
//! A correlation ID lets the caller match a classification result back to
//! the image it came from. Providers are called at most once per image and
//! must return a non-empty string.

use blake3::Hasher as Blake3Hasher;
use rand::RngCore;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::CorrelationStrategy;

/// Produces a correlation ID for a block of image bytes.
///
/// Any `Fn(&[u8]) -> String` closure is a provider too.
pub trait CorrelationProvider: Send + Sync {
    fn correlation_id(&self, content: &[u8]) -> String;
}

impl<F> CorrelationProvider for F
where
    F: Fn(&[u8]) -> String + Send + Sync,
{
    fn correlation_id(&self, content: &[u8]) -> String {
        self(content)
    }
}

/// Deterministic provider: the BLAKE3 digest of the content, hex-encoded.
///
/// Identical bytes always get the same ID; distinct bytes collide only with
/// BLAKE3's collision probability.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashCorrelationProvider;

impl HashCorrelationProvider {
    /// Hash an in-memory byte buffer.
    pub fn content_hash(data: &[u8]) -> String {
        let mut hasher = Blake3Hasher::new();
        hasher.update(data);
        hasher.finalize().to_hex().to_string()
    }
}

impl CorrelationProvider for HashCorrelationProvider {
    fn correlation_id(&self, content: &[u8]) -> String {
        Self::content_hash(content)
    }
}

/// Random provider: 128 random bits, hex-encoded.
///
/// Identical images submitted twice get different IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCorrelationProvider;

impl CorrelationProvider for RandomCorrelationProvider {
    fn correlation_id(&self, _content: &[u8]) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.iter().fold(String::with_capacity(32), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }
}

/// Build the provider named by the configured strategy.
pub fn provider_for(strategy: CorrelationStrategy) -> Arc<dyn CorrelationProvider> {
    match strategy {
        CorrelationStrategy::Hash => Arc::new(HashCorrelationProvider),
        CorrelationStrategy::Random => Arc::new(RandomCorrelationProvider),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let provider = HashCorrelationProvider;
        let id1 = provider.correlation_id(b"test data");
        let id2 = provider.correlation_id(b"test data");
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 64);
    }

    #[test]
    fn test_hash_distinguishes_content() {
        let provider = HashCorrelationProvider;
        assert_ne!(
            provider.correlation_id(b"test1"),
            provider.correlation_id(b"test2")
        );
    }

    #[test]
    fn test_hash_of_empty_input_is_non_empty() {
        assert!(!HashCorrelationProvider.correlation_id(b"").is_empty());
    }

    #[test]
    fn test_random_ids_differ() {
        let provider = RandomCorrelationProvider;
        let id1 = provider.correlation_id(b"same");
        let id2 = provider.correlation_id(b"same");
        assert_eq!(id1.len(), 32);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_closure_provider() {
        let provider = |content: &[u8]| format!("len-{}", content.len());
        assert_eq!(provider.correlation_id(b"abcd"), "len-4");
    }

    #[test]
    fn test_provider_for_strategy() {
        let hash = provider_for(CorrelationStrategy::Hash);
        assert_eq!(
            hash.correlation_id(b"x"),
            HashCorrelationProvider::content_hash(b"x")
        );
    }
}
