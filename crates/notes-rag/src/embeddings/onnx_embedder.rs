//! ONNX-based embedding generation
//!
//! Runs a sentence-transformers model (all-MiniLM-L6-v2 by default) exported
//! to ONNX, with mean pooling over the attention mask and L2 normalization.
//! Model and tokenizer files are fetched from Hugging Face on first use and
//! cached under `embeddings.cache_dir/<model>/`.

use async_trait::async_trait;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;

/// ONNX-based text embedder
///
/// The session is not shareable across threads while running, so inference
/// is serialized behind a mutex and executed on the blocking pool.
pub struct OnnxEmbedder {
    model: Arc<Mutex<OnnxModel>>,
    dimensions: usize,
    model_id: String,
}

struct OnnxModel {
    /// ONNX Runtime session
    session: Session,
    /// HuggingFace tokenizer
    tokenizer: Tokenizer,
    /// Embedding dimensions
    dimensions: usize,
    /// Maximum sequence length
    max_length: usize,
    /// Batch size
    batch_size: usize,
}

impl OnnxEmbedder {
    /// Create a new ONNX embedder, downloading model files if needed
    pub async fn new(config: &EmbeddingConfig) -> Result<Self> {
        tracing::info!("Initializing ONNX embedder with model: {}", config.model);

        let model_dir = config.cache_dir.join(&config.model);
        std::fs::create_dir_all(&model_dir).map_err(|e| {
            Error::Config(format!("Failed to create cache directory: {}", e))
        })?;

        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !model_path.exists() {
            let url = format!(
                "https://huggingface.co/sentence-transformers/{}/resolve/main/onnx/model.onnx",
                config.model
            );
            download_file(&url, &model_path, "model").await?;
        }

        if !tokenizer_path.exists() {
            let url = format!(
                "https://huggingface.co/sentence-transformers/{}/resolve/main/tokenizer.json",
                config.model
            );
            download_file(&url, &tokenizer_path, "tokenizer").await?;
        }

        let session = tokio::task::spawn_blocking(move || load_session(&model_path))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Embedding(format!("Failed to load tokenizer: {}", e)))?;

        tracing::info!("ONNX embedder initialized successfully");

        let model = OnnxModel {
            session,
            tokenizer,
            dimensions: config.dimensions,
            max_length: config.max_length,
            batch_size: config.batch_size.max(1),
        };

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimensions: config.dimensions,
            model_id: config.model_id(),
        })
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| Error::Embedding(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| Error::Embedding(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(4)
        .map_err(|e| Error::Embedding(format!("Failed to set threads: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| Error::Embedding(format!("Failed to load model: {}", e)))
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| {
            Error::Embedding("Empty embedding result".to_string())
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let texts = texts.to_vec();
        let embeddings = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            model.lock().embed_batch(&refs)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        for vector in &embeddings {
            super::check_dimensions(vector, self.dimensions)?;
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Token ids, attention mask and type ids for one padded batch, row-major
struct EncodedBatch {
    rows: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
}

impl OnnxModel {
    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let encoded = self.encode(batch)?;
            vectors.extend(self.run(&encoded)?);
        }
        Ok(vectors)
    }

    /// Tokenize and pad to the longest sequence, truncated at `max_length`
    fn encode(&self, texts: &[&str]) -> Result<EncodedBatch> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::embedding(format!("Tokenization failed: {}", e)))?;

        let rows = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_length);

        let mut batch = EncodedBatch {
            rows,
            seq_len,
            input_ids: vec![0; rows * seq_len],
            attention_mask: vec![0; rows * seq_len],
            token_type_ids: vec![0; rows * seq_len],
        };

        for (row, encoding) in encodings.iter().enumerate() {
            let offset = row * seq_len;
            let tokens = encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids())
                .take(seq_len);
            for (col, ((id, mask), type_id)) in tokens.enumerate() {
                batch.input_ids[offset + col] = i64::from(*id);
                batch.attention_mask[offset + col] = i64::from(*mask);
                batch.token_type_ids[offset + col] = i64::from(*type_id);
            }
        }

        Ok(batch)
    }

    fn run(&mut self, batch: &EncodedBatch) -> Result<Vec<Vec<f32>>> {
        let shape = vec![batch.rows, batch.seq_len];
        let tensor = |name: &str, data: &[i64]| {
            Tensor::from_array((shape.clone(), data.to_vec().into_boxed_slice()))
                .map_err(|e| Error::embedding(format!("Failed to build {} tensor: {}", name, e)))
        };

        let inputs = vec![
            ("input_ids", tensor("input_ids", &batch.input_ids)?.into_dyn()),
            ("attention_mask", tensor("attention_mask", &batch.attention_mask)?.into_dyn()),
            ("token_type_ids", tensor("token_type_ids", &batch.token_type_ids)?.into_dyn()),
        ];

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| Error::embedding(format!("Inference failed: {}", e)))?;

        let named: Vec<_> = outputs.iter().collect();
        let hidden_state = named
            .iter()
            .find(|(name, _)| *name == "last_hidden_state")
            .or_else(|| named.first())
            .map(|(_, value)| value)
            .ok_or_else(|| Error::embedding("Model produced no output tensor"))?;

        let (shape, data) = hidden_state
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::embedding(format!("Failed to read output tensor: {}", e)))?;
        let hidden_size = shape.get(2).map(|&d| d as usize).unwrap_or(self.dimensions);

        Ok(mean_pool(data, &batch.attention_mask, batch.rows, batch.seq_len, hidden_size))
    }
}

/// Average token states under the attention mask, then L2-normalize each row
///
/// `hidden` is `[rows, seq_len, hidden_size]` row-major.
fn mean_pool(
    hidden: &[f32],
    mask: &[i64],
    rows: usize,
    seq_len: usize,
    hidden_size: usize,
) -> Vec<Vec<f32>> {
    (0..rows)
        .map(|row| {
            let mut pooled = vec![0.0f32; hidden_size];
            let mut weight = 0.0f32;

            for token in 0..seq_len {
                let m = mask[row * seq_len + token] as f32;
                if m <= 0.0 {
                    continue;
                }
                let base = (row * seq_len + token) * hidden_size;
                if let Some(state) = hidden.get(base..base + hidden_size) {
                    for (acc, v) in pooled.iter_mut().zip(state) {
                        *acc += v * m;
                    }
                    weight += m;
                }
            }

            if weight > 0.0 {
                pooled.iter_mut().for_each(|v| *v /= weight);
            }
            l2_normalize(&mut pooled);
            pooled
        })
        .collect()
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Download a model file into the cache
async fn download_file(url: &str, path: &Path, what: &str) -> Result<()> {
    tracing::info!("Downloading {} from: {}", what, url);

    let response = reqwest::get(url).await.map_err(|e| {
        Error::Embedding(format!("Failed to download {}: {}", what, e))
    })?;

    if !response.status().is_success() {
        return Err(Error::Embedding(format!(
            "{} download failed: HTTP {}",
            what,
            response.status()
        )));
    }

    let bytes = response.bytes().await.map_err(|e| {
        Error::Embedding(format!("Failed to read {} bytes: {}", what, e))
    })?;

    // Only complete downloads land at `path`.
    let partial = path.with_extension("part");
    std::fs::write(&partial, &bytes)
        .and_then(|_| std::fs::rename(&partial, path))
        .map_err(|e| Error::Embedding(format!("Failed to save {}: {}", what, e)))?;

    tracing::info!("Downloaded {} ({} bytes)", what, bytes.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_ignores_padding() {
        // two rows, three tokens, two hidden units; row 1 has one padded token
        let hidden = [
            1.0, 0.0, 3.0, 0.0, 5.0, 0.0, //
            0.0, 2.0, 0.0, 4.0, 9.0, 9.0,
        ];
        let mask = [1, 1, 1, 1, 1, 0];

        let pooled = mean_pool(&hidden, &mask, 2, 3, 2);

        assert_eq!(pooled.len(), 2);
        assert_eq!(pooled[0], vec![1.0, 0.0]);
        assert_eq!(pooled[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_mean_pool_all_masked_is_zero() {
        let pooled = mean_pool(&[1.0, 2.0], &[0], 1, 1, 2);
        assert_eq!(pooled, vec![vec![0.0, 0.0]]);
    }
}
