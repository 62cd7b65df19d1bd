//! Core types for the notes RAG pipeline

pub mod chat;
pub mod document;
pub mod response;

pub use chat::{ChatEntry, ChatRole};
pub use document::{Chunk, ChunkSource, Document, VectorEntry};
pub use response::{Answer, AnswerMode, SearchHit, SourceRef};
