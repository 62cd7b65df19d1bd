//! Configuration for the notes RAG pipeline
//!
//! Values come from (in increasing precedence) the built-in defaults, an
//! optional TOML file, a `.env` file and process environment variables.
//! The binaries apply their command-line flags on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the notes directory
pub const ENV_NOTES_DIR: &str = "NOTES_RAG_NOTES_DIR";
/// Environment variable overriding the index directory
pub const ENV_INDEX_DIR: &str = "NOTES_RAG_INDEX_DIR";
/// Environment variables checked (in order) for the Gemini credential
pub const ENV_API_KEYS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Notes corpus location
    pub notes: NotesConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Vector index configuration
    pub vector_db: VectorDbConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Gemini/LLM configuration
    pub llm: LlmConfig,
    /// Web shell configuration
    pub server: ServerConfig,
}

impl RagConfig {
    /// Load configuration from an optional TOML file plus `.env` and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", env_file.display());
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse TOML configuration text
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_NOTES_DIR).filter(|v| !v.is_empty()) {
            self.notes.directory = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_INDEX_DIR).filter(|v| !v.is_empty()) {
            self.vector_db.persist_dir = PathBuf::from(dir);
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = ENV_API_KEYS
                .iter()
                .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()));
        }
    }

    /// Reject settings the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be at least 1".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be at least 1".to_string()));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::Config("embeddings.batch_size must be at least 1".to_string()));
        }
        if self.notes.extensions.is_empty() {
            return Err(Error::Config("notes.extensions must name at least one extension".to_string()));
        }
        Ok(())
    }
}

/// Notes corpus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    /// Directory holding the PDF notes
    pub directory: PathBuf,
    /// Recognized file extensions (case-insensitive, without the dot)
    pub extensions: Vec<String>,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./data"),
            extensions: vec!["pdf".to_string()],
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Which in-process embedder to run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Sentence-transformer exported to ONNX
    Onnx,
    /// Token feature hashing, no model download
    Hashing,
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        if cfg!(feature = "onnx") {
            Self::Onnx
        } else {
            Self::Hashing
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedder implementation
    pub backend: EmbeddingBackend,
    /// Model to use (sentence-transformers repository name)
    pub model: String,
    /// Embedding dimensions (384 for MiniLM)
    pub dimensions: usize,
    /// Batch size for embedding generation
    pub batch_size: usize,
    /// Maximum sequence length in tokens
    pub max_length: usize,
    /// Cache directory for model files
    pub cache_dir: PathBuf,
}

impl EmbeddingConfig {
    /// Identifier stored alongside the index so a model change forces a rebuild
    pub fn model_id(&self) -> String {
        match self.backend {
            EmbeddingBackend::Onnx => format!("onnx:{}:{}", self.model, self.dimensions),
            EmbeddingBackend::Hashing => format!("hashing:{}", self.dimensions),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            batch_size: 32,
            max_length: 256,
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("notes-rag")
                .join("models"),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Directory holding the persisted index
    pub persist_dir: PathBuf,
    /// Re-embed when the corpus or model no longer matches the persisted index
    pub rebuild_on_change: bool,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("./notes_index"),
            rebuild_on_change: true,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Gemini configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Try to connect a generation backend at all
    pub enabled: bool,
    /// API key (usually supplied through the environment)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Generative Language API base URL
    pub base_url: String,
    /// Model tried first
    pub primary_model: String,
    /// Model tried when the primary fails its probe
    pub fallback_model: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Output token limit
    pub max_output_tokens: u32,
    /// Request timeout in seconds (none by default)
    pub timeout_secs: Option<u64>,
    /// Number of retries for failed generation requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            primary_model: "gemini-2.0-flash".to_string(),
            fallback_model: Some("gemini-2.0-flash-lite".to_string()),
            temperature: 0.3,
            max_output_tokens: 2048,
            timeout_secs: None,
            max_retries: 0,
        }
    }
}

/// Web shell configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable permissive CORS on the JSON API
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            enable_cors: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_pipeline_contract() {
        let config = RagConfig::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.llm.primary_model, "gemini-2.0-flash");
        assert_eq!(config.llm.fallback_model.as_deref(), Some("gemini-2.0-flash-lite"));
        assert!(config.llm.timeout_secs.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RagConfig::from_toml(
            r#"
            [chunking]
            chunk_size = 500

            [notes]
            directory = "/srv/notes"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.notes.directory, PathBuf::from("/srv/notes"));
        assert_eq!(config.embeddings.dimensions, 384);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_NOTES_DIR, "/tmp/notes"),
            ("GOOGLE_API_KEY", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.notes.directory, PathBuf::from("/tmp/notes"));
        assert_eq!(config.llm.api_key.as_deref(), Some("secret"));
        assert_eq!(config.vector_db.persist_dir, PathBuf::from("./notes_index"));
    }

    #[test]
    fn test_configured_key_wins_over_env() {
        let mut config = RagConfig::default();
        config.llm.api_key = Some("from-file".to_string());
        config.apply_env_from(|_| Some("from-env".to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = 1000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let mut config = RagConfig::default();
        config.llm.api_key = Some("secret".to_string());
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("secret"));
    }
}
