//! Provider abstractions for embeddings and text generation
//!
//! The retrieval and answer layers only see these traits, so the ONNX
//! embedder and the Gemini client can be swapped for offline stand-ins.

pub mod embedding;
pub mod gemini;
pub mod llm;

pub use embedding::EmbeddingProvider;
pub use gemini::GeminiClient;
pub use llm::LlmProvider;
