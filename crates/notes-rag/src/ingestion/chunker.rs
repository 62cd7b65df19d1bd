//! Recursive character text splitting with page tracking
//!
//! Text is split on the coarsest separator present (paragraph, line,
//! sentence, word, character), pieces that are still too long are split
//! again with the finer separators, and the pieces are then merged back
//! into windows of at most `chunk_size` characters with up to
//! `chunk_overlap` characters carried between consecutive windows.

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkSource, Document};

/// Separators tried in order, coarsest first
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` on `separator`, keeping each separator at the start of the
/// piece that follows it. An empty separator splits into characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Overlap between chunks in characters
    overlap: usize,
    separators: Vec<String>,
}

impl TextChunker {
    /// Create a chunker; `overlap` must be smaller than `chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be at least 1".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Maximum chunk size in characters
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap in characters
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk every page, preserving page order then position order
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect();

        tracing::info!(
            "Split {} pages into {} chunks (size {}, overlap {})",
            documents.len(),
            chunks.len(),
            self.chunk_size,
            self.overlap
        );

        chunks
    }

    /// Chunk a single page; chunks never span pages
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let source = ChunkSource::from_document(doc);
        self.split_text(&doc.text)
            .into_iter()
            .enumerate()
            .map(|(idx, content)| Chunk::new(content, source.clone(), idx as u32))
            .collect()
    }

    /// Split raw text into trimmed, non-empty chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                remaining = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut final_chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }

            if !good.is_empty() {
                final_chunks.extend(self.merge_splits(&good));
                good.clear();
            }

            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(&good));
        }

        final_chunks
    }

    /// Merge small pieces into windows, carrying the tail of each window
    /// into the next one as overlap
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                Self::push_window(&current, &mut docs);

                while total > self.overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some((_, first_len)) => total -= first_len,
                        None => break,
                    }
                }
            }

            current.push_back((piece, len));
            total += len;
        }

        Self::push_window(&current, &mut docs);
        docs
    }

    fn push_window(current: &VecDeque<(&str, usize)>, docs: &mut Vec<String>) {
        let joined: String = current.iter().map(|(piece, _)| *piece).collect();
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            docs.push(trimmed.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = TextChunker::new(1000, 200).unwrap();
        let chunks = chunker.split_text("  A short note about perceptrons.  ");
        assert_eq!(chunks, vec!["A short note about perceptrons.".to_string()]);
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        let chunker = TextChunker::new(100, 10).unwrap();
        assert!(chunker.split_text("").is_empty());
        assert!(chunker.split_text(" \n\n \n").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let chunker = TextChunker::new(100, 30).unwrap();
        let text = words(400);
        let chunks = chunker.split_text(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| char_len(c) <= 100));
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let chunker = TextChunker::new(100, 30).unwrap();
        let text = words(300);
        let chunks = chunker.split_text(&text);

        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            let prev_words: Vec<&str> = pair[0].split(' ').collect();
            assert!(prev_words.contains(&first_word), "{:?} not carried from {:?}", first_word, pair[0]);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let p1 = "Alpha beta gamma delta.";
        let p2 = "Epsilon zeta eta theta iota kappa lambda mu nu xi omicron.";
        let chunker = TextChunker::new(70, 10).unwrap();

        let chunks = chunker.split_text(&format!("{}\n\n{}", p1, p2));

        assert_eq!(chunks, vec![p1.to_string(), p2.to_string()]);
    }

    #[test]
    fn test_unbroken_text_is_hard_cut() {
        let chunker = TextChunker::new(50, 5).unwrap();
        let text = "x".repeat(180);
        let chunks = chunker.split_text(&text);

        assert!(chunks.iter().all(|c| char_len(c) <= 50));
        assert!(chunks.iter().map(|c| char_len(c)).sum::<usize>() >= 180);
    }

    #[test]
    fn test_length_counts_characters() {
        let chunker = TextChunker::new(20, 0).unwrap();
        let text = "é".repeat(45);
        let chunks = chunker.split_text(&text);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| char_len(c) <= 20));
    }

    #[test]
    fn test_chunks_stay_within_their_page() {
        let chunker = TextChunker::new(60, 10).unwrap();
        let docs = vec![
            Document::new(words(40), "unit1", "unit1.pdf", 0, 2),
            Document::new("Short second page.", "unit1", "unit1.pdf", 1, 2),
        ];

        let chunks = chunker.chunk_documents(&docs);

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            let page_text = &docs[chunk.source.page as usize].text;
            assert!(page_text.contains(&chunk.content));
            assert_eq!(chunk.source.unit, "unit1");
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.source.page, 1);
        assert_eq!(last.chunk_index, 0);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(100, 100).is_err());
        assert!(TextChunker::new(100, 150).is_err());
    }
}
