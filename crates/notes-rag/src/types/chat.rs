//! Chat transcript entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::response::{Answer, SourceRef};

/// Who authored a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry in the session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Author
    pub role: ChatRole,
    /// Message text
    pub content: String,
    /// Sources used (assistant entries only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    /// Set when the entry reports a failed query
    #[serde(default)]
    pub is_error: bool,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

impl ChatEntry {
    /// A question typed by the user
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            sources: Vec::new(),
            is_error: false,
            created_at: Utc::now(),
        }
    }

    /// An answer with its sources
    pub fn assistant(answer: &Answer) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: answer.answer.clone(),
            sources: answer.source_refs(),
            is_error: false,
            created_at: Utc::now(),
        }
    }

    /// An answer-shaped entry for a failed query
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: format!("Error: {}", message),
            sources: Vec::new(),
            is_error: true,
            created_at: Utc::now(),
        }
    }
}
