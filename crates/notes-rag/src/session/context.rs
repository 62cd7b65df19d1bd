//! Session setup and question handling

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use super::transcript::Transcript;
use crate::config::RagConfig;
use crate::embeddings::create_embedder;
use crate::error::{Error, Result};
use crate::generation::AnswerGenerator;
use crate::ingestion::{DocumentLoader, LoadFailure, LoadedFile, TextChunker};
use crate::providers::{GeminiClient, LlmProvider};
use crate::retrieval::{BuildOutcome, VectorIndex};
use crate::types::{Answer, ChatEntry};

/// Setup stage reported to progress callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStage {
    Loading,
    Chunking,
    Indexing,
    ConnectingBackend,
    Ready,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SetupStage::Loading => "loading notes",
            SetupStage::Chunking => "chunking",
            SetupStage::Indexing => "building index",
            SetupStage::ConnectingBackend => "connecting to Gemini",
            SetupStage::Ready => "ready",
        };
        f.write_str(label)
    }
}

/// Summary of a completed setup
#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    /// Files that loaded
    pub files: Vec<LoadedFile>,
    /// Files that were skipped
    pub failures: Vec<LoadFailure>,
    /// Page documents loaded
    pub pages: usize,
    /// Chunks produced
    pub chunks: usize,
    /// Entries in the index after build
    pub indexed: usize,
    /// Whether the index was embedded or reused
    pub build_outcome: BuildOutcome,
    /// Model answering questions, if a backend connected
    pub llm_model: Option<String>,
    /// Why no backend is attached
    pub llm_error: Option<String>,
    /// Wall-clock setup time
    pub elapsed_ms: u64,
}

/// One submitted question with its outcome
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    /// The answer, when the query succeeded
    pub answer: Option<Answer>,
    /// The user entry and the reply entry appended for this question
    pub entries: Vec<ChatEntry>,
}

/// Load, chunk, index and connect, reporting each stage to `progress`
///
/// A backend that cannot be reached does not fail setup; the generator is
/// returned without one and the reason is recorded in the report.
pub async fn setup_pipeline(
    config: &RagConfig,
    progress: &(dyn Fn(SetupStage, &str) + Send + Sync),
) -> Result<(AnswerGenerator, SetupReport)> {
    let start = Instant::now();

    progress(
        SetupStage::Loading,
        &format!("Loading notes from {}", config.notes.directory.display()),
    );
    let loader = DocumentLoader::from_config(&config.notes);
    let notes_dir = config.notes.directory.clone();
    let load = tokio::task::spawn_blocking(move || loader.load_dir(&notes_dir))
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

    if load.is_empty() {
        tracing::warn!("No notes found in {}", config.notes.directory.display());
    } else {
        tracing::debug!("Units: {}", load.units().join(", "));
    }

    progress(
        SetupStage::Chunking,
        &format!("Splitting {} pages from {} files", load.documents.len(), load.files.len()),
    );
    let chunker = TextChunker::from_config(&config.chunking)?;
    let chunks = chunker.chunk_documents(&load.documents);

    progress(
        SetupStage::Indexing,
        &format!("Indexing {} chunks in {}", chunks.len(), config.vector_db.persist_dir.display()),
    );
    let embedder = create_embedder(&config.embeddings).await?;
    let index = VectorIndex::open(&config.vector_db.persist_dir, embedder)?
        .with_rebuild_on_change(config.vector_db.rebuild_on_change)
        .with_batch_size(config.embeddings.batch_size);
    let build_outcome = index.build(&chunks).await?;
    let indexed = index.len();

    let mut generator = AnswerGenerator::new(config.retrieval.top_k).with_index(Arc::new(index));
    let mut llm_model = None;
    let mut llm_error = None;

    if config.llm.enabled {
        progress(SetupStage::ConnectingBackend, "Connecting to Gemini");
        match GeminiClient::connect(&config.llm).await {
            Ok(client) => {
                llm_model = Some(client.model().to_string());
                generator = generator.with_llm(Arc::new(client));
            }
            Err(e) => {
                tracing::warn!("Continuing without answer generation: {}", e);
                llm_error = Some(e.to_string());
            }
        }
    } else {
        tracing::info!("Answer generation disabled; answers will quote the notes");
        llm_error = Some("generation is disabled".to_string());
    }

    let report = SetupReport {
        files: load.files,
        failures: load.failures,
        pages: load.documents.len(),
        chunks: chunks.len(),
        indexed,
        build_outcome,
        llm_model,
        llm_error,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    progress(
        SetupStage::Ready,
        &format!("Ready: {} chunks indexed in {}ms", report.indexed, report.elapsed_ms),
    );
    tracing::info!(
        "Setup complete: {} files, {} pages, {} chunks ({:?})",
        report.files.len(),
        report.pages,
        report.chunks,
        report.build_outcome
    );

    Ok((generator, report))
}

/// Transcript plus the index and generator handles for one session
pub struct SessionContext {
    config: RagConfig,
    transcript: Transcript,
    generator: AnswerGenerator,
    report: Option<SetupReport>,
}

impl SessionContext {
    /// A context with no index attached; every question is answered with `NotReady`
    pub fn new(config: RagConfig) -> Self {
        let generator = AnswerGenerator::new(config.retrieval.top_k);
        Self {
            config,
            transcript: Transcript::new(),
            generator,
            report: None,
        }
    }

    /// Run setup and return a ready context
    pub async fn start(config: RagConfig) -> Result<Self> {
        Self::start_with_progress(config, &|stage, message| {
            tracing::debug!("setup [{}] {}", stage, message);
        })
        .await
    }

    /// Run setup, reporting each stage to `progress`
    pub async fn start_with_progress(
        config: RagConfig,
        progress: &(dyn Fn(SetupStage, &str) + Send + Sync),
    ) -> Result<Self> {
        match setup_pipeline(&config, progress).await {
            Ok((generator, report)) => Ok(Self {
                config,
                transcript: Transcript::new(),
                generator,
                report: Some(report),
            }),
            Err(e) => {
                tracing::error!("Setup failed: {}", e);
                Err(e)
            }
        }
    }

    /// Replace the generation backend
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.generator = self.generator.with_llm(llm);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Transcript so far
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Answer generator handle
    pub fn generator(&self) -> &AnswerGenerator {
        &self.generator
    }

    /// Setup summary, when setup ran
    pub fn report(&self) -> Option<&SetupReport> {
        self.report.as_ref()
    }

    /// True once an index is attached
    pub fn is_ready(&self) -> bool {
        self.generator.index().is_some()
    }

    /// Ask a question and record it in the transcript
    ///
    /// Blank questions are rejected with [`Error::EmptyQuestion`] and leave the
    /// transcript untouched. Any other failure is recorded as an error entry.
    pub async fn submit(&mut self, question: &str) -> Result<Exchange> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::EmptyQuestion);
        }

        let outcome = self.generator.answer(question).await;
        if let Err(e) = &outcome {
            tracing::warn!("Query failed: {}", e);
        }

        let entries = self.transcript.record(question, &outcome).to_vec();
        Ok(Exchange {
            answer: outcome.ok(),
            entries,
        })
    }

    /// Discard all transcript entries
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Start the conversation over, keeping the index and backend
    pub fn reset(&mut self) {
        self.transcript = Transcript::new();
        tracing::info!("Session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GENERATION_ERROR_PREFIX, NO_CONTEXT_MESSAGE};
    use crate::test_support::{offline_config, write_pdf, ScriptedLlm};
    use crate::types::{AnswerMode, ChatRole};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_start_reports_stages_and_answers_from_notes() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        write_pdf(notes.path(), "unit1.pdf", &["Neural networks are layered."]);
        write_pdf(notes.path(), "unit2.pdf", &["Photosynthesis happens in leaves."]);

        let stages = Mutex::new(Vec::new());
        let mut session = SessionContext::start_with_progress(
            offline_config(notes.path(), index.path()),
            &|stage, _| stages.lock().push(stage),
        )
        .await
        .unwrap();

        assert_eq!(
            stages.lock().clone(),
            vec![SetupStage::Loading, SetupStage::Chunking, SetupStage::Indexing, SetupStage::Ready]
        );
        let report = session.report().unwrap();
        assert_eq!(report.pages, 2);
        assert_eq!(report.build_outcome, BuildOutcome::Built);

        let exchange = session.submit("What are neural networks?").await.unwrap();
        let answer = exchange.answer.unwrap();
        assert_eq!(answer.mode, AnswerMode::RetrievalOnly);
        assert_eq!(answer.sources[0].chunk.source.unit, "unit1");
        assert_eq!(answer.source_refs()[0].format_numbered(1), "Source 1: Unit unit1 - Page 1");
        assert_eq!(session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_corpus_states_nothing_found() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        let mut session = SessionContext::start(offline_config(notes.path(), index.path()))
            .await
            .unwrap();

        let exchange = session.submit("anything").await.unwrap();

        let answer = exchange.answer.unwrap();
        assert_eq!(answer.answer, NO_CONTEXT_MESSAGE);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_blank_question_leaves_transcript_untouched() {
        let mut session = SessionContext::new(RagConfig::default());
        let err = session.submit("   \n").await.unwrap_err();
        assert!(matches!(err, Error::EmptyQuestion));
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_unready_session_records_error_entry() {
        let mut session = SessionContext::new(RagConfig::default());
        let exchange = session.submit("What is entropy?").await.unwrap();

        assert!(exchange.answer.is_none());
        assert_eq!(exchange.entries[0].role, ChatRole::User);
        assert!(exchange.entries[1].is_error);
        assert!(exchange.entries[1].content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_failing_backend_still_answers() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        write_pdf(notes.path(), "unit1.pdf", &["Neural networks are layered."]);
        let mut session = SessionContext::start(offline_config(notes.path(), index.path()))
            .await
            .unwrap()
            .with_llm(Arc::new(ScriptedLlm::failing("service unavailable")));

        let exchange = session.submit("What are neural networks?").await.unwrap();

        let reply = &exchange.entries[1];
        assert!(!reply.is_error);
        assert!(reply.content.starts_with(GENERATION_ERROR_PREFIX));
        assert_eq!(reply.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_continues_without_backend() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        let mut config = offline_config(notes.path(), index.path());
        config.llm.enabled = true;
        config.llm.api_key = None;

        let session = SessionContext::start(config).await.unwrap();

        let report = session.report().unwrap();
        assert!(report.llm_model.is_none());
        assert!(report.llm_error.as_deref().unwrap().contains("API key"));
        assert!(session.generator().llm_model().is_none());
    }

    #[tokio::test]
    async fn test_clear_and_reset() {
        let notes = TempDir::new().unwrap();
        let index = TempDir::new().unwrap();
        write_pdf(notes.path(), "unit1.pdf", &["Neural networks are layered."]);
        let mut session = SessionContext::start(offline_config(notes.path(), index.path()))
            .await
            .unwrap();

        session.submit("networks").await.unwrap();
        session.clear();
        assert!(session.transcript().is_empty());

        session.submit("networks").await.unwrap();
        session.reset();
        assert!(session.transcript().is_empty());
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_missing_notes_directory_fails_setup() {
        let index = TempDir::new().unwrap();
        let config = offline_config(&index.path().join("nope"), index.path());
        let err = SessionContext::start(config).await.err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
