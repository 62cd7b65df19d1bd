//! Page, chunk and index entry types with source tracking

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One page of a notes PDF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Extracted page text
    pub text: String,
    /// Owning file identifier (filename minus extension)
    pub unit: String,
    /// Source filename including extension
    pub source: String,
    /// Page number (0-based)
    pub page: u32,
    /// Total pages in the owning file
    pub page_count: u32,
}

impl Document {
    /// Create a page document for a file
    pub fn new(text: impl Into<String>, unit: impl Into<String>, source: impl Into<String>, page: u32, page_count: u32) -> Self {
        Self {
            text: text.into(),
            unit: unit.into(),
            source: source.into(),
            page,
            page_count,
        }
    }

    /// 1-based page number for display
    pub fn display_page(&self) -> u32 {
        self.page + 1
    }
}

/// Metadata a chunk inherits from its page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkSource {
    /// Owning file identifier
    pub unit: String,
    /// Source filename
    pub source: String,
    /// Page number (0-based)
    pub page: u32,
}

impl ChunkSource {
    /// Copy the source metadata of a page
    pub fn from_document(doc: &Document) -> Self {
        Self {
            unit: doc.unit.clone(),
            source: doc.source.clone(),
            page: doc.page,
        }
    }

    /// 1-based page number for display
    pub fn display_page(&self) -> u32 {
        self.page + 1
    }

    /// Format as `Unit <unit> - Page <n>`
    pub fn format_inline(&self) -> String {
        format!("Unit {} - Page {}", self.unit, self.display_page())
    }
}

/// A bounded text span taken from one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Chunk text
    pub content: String,
    /// Page the chunk came from
    pub source: ChunkSource,
    /// Position of this chunk within its page
    pub chunk_index: u32,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(content: String, source: ChunkSource, chunk_index: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            source,
            chunk_index,
        }
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A chunk together with its embedding, as persisted in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// The embedded chunk
    pub chunk: Chunk,
    /// Embedding vector
    pub vector: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_page_is_one_based() {
        let doc = Document::new("text", "unit1", "unit1.pdf", 0, 3);
        let source = ChunkSource::from_document(&doc);
        assert_eq!(doc.display_page(), 1);
        assert_eq!(source.format_inline(), "Unit unit1 - Page 1");
    }

    #[test]
    fn test_char_len_counts_characters() {
        let chunk = Chunk::new(
            "naïve café".to_string(),
            ChunkSource {
                unit: "u".to_string(),
                source: "u.pdf".to_string(),
                page: 0,
            },
            0,
        );
        assert_eq!(chunk.char_len(), 10);
    }
}
