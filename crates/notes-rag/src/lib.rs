//! notes-rag: question answering over a folder of PDF study notes
//!
//! PDFs are split into per-page documents, chunked, embedded with a local
//! model and stored in a persisted vector index. Questions retrieve the
//! closest chunks and, when a Gemini backend is reachable, an answer grounded
//! in those chunks is generated. A web shell and a terminal shell drive a
//! [`SessionContext`] that keeps the chat transcript.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use generation::AnswerGenerator;
pub use retrieval::VectorIndex;
pub use session::{SessionContext, Transcript};
pub use types::{Answer, AnswerMode, ChatEntry, Chunk, ChunkSource, Document, SearchHit, SourceRef};
