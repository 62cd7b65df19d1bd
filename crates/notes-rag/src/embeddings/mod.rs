//! In-process text embedders

pub mod hashing;
#[cfg(feature = "onnx")]
pub mod onnx_embedder;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;

pub use hashing::HashingEmbedder;
#[cfg(feature = "onnx")]
pub use onnx_embedder::OnnxEmbedder;

/// Build the embedder selected in configuration
pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        #[cfg(feature = "onnx")]
        EmbeddingBackend::Onnx => Ok(Arc::new(OnnxEmbedder::new(config).await?)),
        #[cfg(not(feature = "onnx"))]
        EmbeddingBackend::Onnx => Err(Error::Config(
            "embeddings.backend = \"onnx\" requires the `onnx` feature".to_string(),
        )),
    }
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Reject vectors whose length does not match the embedder
pub(crate) fn check_dimensions(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::embedding(format!(
            "expected {} dimensions, got {}",
            expected,
            vector.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_create_hashing_embedder() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Hashing,
            dimensions: 64,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).await.unwrap();
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.model_id(), "hashing:64");
    }
}
