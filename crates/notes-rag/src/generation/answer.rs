//! Retrieval plus grounded generation for one question

use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::retrieval::{VectorIndex, DEFAULT_TOP_K};
use crate::types::{Answer, AnswerMode};

use super::prompt::PromptBuilder;

/// Answer when retrieval found nothing
pub const NO_CONTEXT_MESSAGE: &str =
    "No relevant information was found in your notes for this question.";
/// Prefix of the answer when no backend is attached
pub const RETRIEVAL_ONLY_PREFIX: &str = "Relevant information from your notes:\n\n";
/// Prefix of the answer when the backend returned no text
pub const EMPTY_RESPONSE_PREFIX: &str =
    "I couldn't generate an answer. Here's the relevant context from your notes:\n\n";
/// Prefix of the answer when the backend call failed
pub const GENERATION_ERROR_PREFIX: &str = "Error generating AI answer: ";

/// Answers questions from the attached index and optional backend
#[derive(Clone)]
pub struct AnswerGenerator {
    index: Option<Arc<VectorIndex>>,
    llm: Option<Arc<dyn LlmProvider>>,
    top_k: usize,
}

impl Default for AnswerGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

impl AnswerGenerator {
    /// Create a generator retrieving `top_k` chunks per question
    pub fn new(top_k: usize) -> Self {
        Self {
            index: None,
            llm: None,
            top_k,
        }
    }

    /// Attach the vector index
    pub fn with_index(mut self, index: Arc<VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Attach a generation backend
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// The attached index, if any
    pub fn index(&self) -> Option<&Arc<VectorIndex>> {
        self.index.as_ref()
    }

    /// Model name of the attached backend, if any
    pub fn llm_model(&self) -> Option<&str> {
        self.llm.as_ref().map(|llm| llm.model())
    }

    /// Chunks retrieved per question
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer a question with the configured `top_k`
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_with_k(question, self.top_k).await
    }

    /// Answer a question from the `k` most similar chunks
    ///
    /// Backend failures are folded into the answer text; only a missing
    /// index or a retrieval failure is returned as an error.
    pub async fn answer_with_k(&self, question: &str, k: usize) -> Result<Answer> {
        let start = Instant::now();
        let index = self.index.as_ref().ok_or(Error::NotReady)?;

        let hits = index.search(question, k).await?;
        let context = PromptBuilder::build_context(&hits);
        tracing::debug!("Retrieved {} chunks ({} chars of context)", hits.len(), context.len());

        let (answer, mode) = if context.trim().is_empty() {
            (NO_CONTEXT_MESSAGE.to_string(), AnswerMode::NoContext)
        } else if let Some(llm) = &self.llm {
            let prompt = PromptBuilder::build_notes_prompt(question, &context);
            match llm.generate(&prompt).await {
                Ok(text) if !text.trim().is_empty() => (text, AnswerMode::Generated),
                Ok(_) => {
                    tracing::warn!("{} returned an empty answer, falling back to raw notes", llm.name());
                    (format!("{}{}", EMPTY_RESPONSE_PREFIX, context), AnswerMode::GenerationFailed)
                }
                Err(e) => {
                    tracing::warn!("{} generation failed: {}", llm.name(), e);
                    (
                        format!(
                            "{}{}\n\nRelevant context from notes:\n{}",
                            GENERATION_ERROR_PREFIX, e, context
                        ),
                        AnswerMode::GenerationFailed,
                    )
                }
            }
        } else {
            (format!("{}{}", RETRIEVAL_ONLY_PREFIX, context), AnswerMode::RetrievalOnly)
        };

        let sources = if mode == AnswerMode::NoContext { Vec::new() } else { hits };
        let processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Answered in {}ms ({:?}, {} sources)",
            processing_time_ms,
            mode,
            sources.len()
        );

        Ok(Answer {
            question: question.to_string(),
            answer,
            sources,
            mode,
            processing_time_ms,
        })
    }
}
