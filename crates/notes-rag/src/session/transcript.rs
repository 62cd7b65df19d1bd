//! Ordered chat history

use serde::Serialize;

use crate::error::Result;
use crate::types::{Answer, ChatEntry, ChatRole, SourceRef};

/// Ordered user and assistant entries
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    entries: Vec<ChatEntry>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in the order they were appended
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the question and its outcome as one mutation
    ///
    /// A failed query is recorded as an error entry instead of an answer.
    /// Returns the two appended entries.
    pub fn record(&mut self, question: &str, outcome: &Result<Answer>) -> &[ChatEntry] {
        let reply = match outcome {
            Ok(answer) => ChatEntry::assistant(answer),
            Err(e) => ChatEntry::error(e),
        };
        self.record_reply(question, reply)
    }

    /// Append the question and a prepared reply entry
    pub fn record_reply(&mut self, question: &str, reply: ChatEntry) -> &[ChatEntry] {
        let start = self.entries.len();
        self.entries.push(ChatEntry::user(question));
        self.entries.push(reply);
        &self.entries[start..]
    }

    /// Sources of the most recent answer that had any
    pub fn last_sources(&self) -> Option<&[SourceRef]> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.role == ChatRole::Assistant && !e.sources.is_empty())
            .map(|e| e.sources.as_slice())
    }

    /// Discard every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
