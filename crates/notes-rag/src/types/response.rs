//! Search and answer types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Chunk;

/// Search result with chunk and similarity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Cosine similarity (higher is more similar)
    pub similarity: f32,
}

/// How the answer text was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// The model answered from the retrieved notes
    Generated,
    /// No backend configured; raw notes returned
    RetrievalOnly,
    /// The model call failed or was empty; raw notes returned
    GenerationFailed,
    /// Nothing relevant was retrieved
    NoContext,
}

/// A source chunk kept with an answer in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Id of the retrieved chunk
    pub chunk_id: Uuid,
    /// Text of the retrieved chunk
    pub content: String,
    /// Owning file identifier
    pub unit: String,
    /// Source filename
    pub source: String,
    /// 1-based page number
    pub page: u32,
    /// Similarity score of the retrieved chunk
    pub similarity: f32,
}

impl SourceRef {
    /// Build a reference from a search hit
    pub fn from_hit(hit: &SearchHit) -> Self {
        Self {
            chunk_id: hit.chunk.id,
            content: hit.chunk.content.clone(),
            unit: hit.chunk.source.unit.clone(),
            source: hit.chunk.source.source.clone(),
            page: hit.chunk.source.display_page(),
            similarity: hit.similarity,
        }
    }

    /// Format as `Source <n>: Unit <unit> - Page <page>` (n is 1-based)
    pub fn format_numbered(&self, n: usize) -> String {
        format!("Source {}: Unit {} - Page {}", n, self.unit, self.page)
    }
}

/// Result of answering one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The question as asked
    pub question: String,
    /// Answer text (generated, or raw notes with a label)
    pub answer: String,
    /// Chunks used, in retrieval order
    pub sources: Vec<SearchHit>,
    /// How the answer was produced
    pub mode: AnswerMode,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl Answer {
    /// Display references for the sources, in order
    pub fn source_refs(&self) -> Vec<SourceRef> {
        self.sources.iter().map(SourceRef::from_hit).collect()
    }
}
