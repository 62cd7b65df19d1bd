//! Chunk embeddings persisted in redb with exact cosine search
//!
//! Layout of `<persist_dir>/index.redb`:
//! - `entries`: sequence number -> bincode-encoded chunk and vector
//! - `meta`: `model_id`, `dimensions`, `fingerprint`, `built_at`
//!
//! All entries are held in memory after open; search is a parallel scan.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::embeddings::{check_dimensions, cosine_similarity};
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::types::{Chunk, ChunkSource, SearchHit, VectorEntry};

/// Database filename inside the persist directory
pub const INDEX_FILE: &str = "index.redb";
/// Number of hits returned when the caller does not choose
pub const DEFAULT_TOP_K: usize = 5;

const ENTRIES: TableDefinition<u64, &[u8]> = TableDefinition::new("entries");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

const META_MODEL_ID: &str = "model_id";
const META_DIMENSIONS: &str = "dimensions";
const META_FINGERPRINT: &str = "fingerprint";
const META_BUILT_AT: &str = "built_at";

/// Fingerprint of a chunked corpus under a given embedding model
pub fn corpus_fingerprint(chunks: &[Chunk], model_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update([0u8]);
    for chunk in chunks {
        hasher.update(chunk.source.unit.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.source.page.to_le_bytes());
        hasher.update(chunk.chunk_index.to_le_bytes());
        hasher.update(chunk.content.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// What `build` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Nothing was persisted; all chunks were embedded
    Built,
    /// The persisted index was reused as is
    Loaded,
    /// The persisted index was stale and was embedded again
    Rebuilt,
}

/// On-disk record; ids are kept as strings in the binary encoding
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    content: String,
    unit: String,
    source: String,
    page: u32,
    chunk_index: u32,
    vector: Vec<f32>,
}

impl StoredEntry {
    fn from_entry(entry: &VectorEntry) -> Self {
        Self {
            id: entry.chunk.id.to_string(),
            content: entry.chunk.content.clone(),
            unit: entry.chunk.source.unit.clone(),
            source: entry.chunk.source.source.clone(),
            page: entry.chunk.source.page,
            chunk_index: entry.chunk.chunk_index,
            vector: entry.vector.clone(),
        }
    }

    fn into_entry(self) -> Result<VectorEntry> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::vector_db(format!("corrupt chunk id {}: {}", self.id, e)))?;
        Ok(VectorEntry {
            chunk: Chunk {
                id,
                content: self.content,
                source: ChunkSource {
                    unit: self.unit,
                    source: self.source,
                    page: self.page,
                },
                chunk_index: self.chunk_index,
            },
            vector: self.vector,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct IndexMeta {
    model_id: Option<String>,
    dimensions: Option<usize>,
    fingerprint: Option<String>,
}

/// Persistent vector index over note chunks
pub struct VectorIndex {
    db: Arc<Database>,
    path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<VectorEntry>>,
    meta: RwLock<IndexMeta>,
    rebuild_on_change: bool,
    batch_size: usize,
}

impl VectorIndex {
    /// Open (or create) the index under `persist_dir`, loading any persisted entries
    pub fn open(persist_dir: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let persist_dir = persist_dir.as_ref();
        std::fs::create_dir_all(persist_dir)?;
        let path = persist_dir.join(INDEX_FILE);

        let db = Database::create(&path)?;
        let (entries, meta) = read_all(&db)?;

        if !entries.is_empty() {
            tracing::info!("Opened index at {} with {} entries", path.display(), entries.len());
        }

        Ok(Self {
            db: Arc::new(db),
            path,
            embedder,
            entries: RwLock::new(entries),
            meta: RwLock::new(meta),
            rebuild_on_change: true,
            batch_size: 32,
        })
    }

    /// Whether a corpus or model change triggers re-embedding (default true)
    pub fn with_rebuild_on_change(mut self, rebuild: bool) -> Self {
        self.rebuild_on_change = rebuild;
        self
    }

    /// Number of chunks embedded per embedder call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Fingerprint of the persisted corpus, if any build has completed
    pub fn fingerprint(&self) -> Option<String> {
        self.meta.read().fingerprint.clone()
    }

    /// Embedding model the persisted vectors were produced with
    pub fn model_id(&self) -> Option<String> {
        self.meta.read().model_id.clone()
    }

    /// Build the index from chunks, reusing a persisted index when possible
    pub async fn build(&self, chunks: &[Chunk]) -> Result<BuildOutcome> {
        let model_id = self.embedder.model_id();
        let fingerprint = corpus_fingerprint(chunks, &model_id);
        let persisted = self.meta.read().clone();

        let outcome = match persisted.fingerprint.as_deref() {
            None => BuildOutcome::Built,
            Some(existing) if existing == fingerprint => {
                tracing::info!(
                    "Reusing persisted index ({} entries) at {}",
                    self.len(),
                    self.path.display()
                );
                return Ok(BuildOutcome::Loaded);
            }
            Some(_) if persisted.model_id.as_deref() != Some(model_id.as_str()) => {
                // Vectors from another model are not comparable, stale or not.
                tracing::info!(
                    "Embedding model changed from {} to {}, rebuilding index",
                    persisted.model_id.as_deref().unwrap_or("an unknown model"),
                    model_id
                );
                BuildOutcome::Rebuilt
            }
            Some(_) if self.rebuild_on_change => {
                tracing::info!("Notes changed, rebuilding index");
                BuildOutcome::Rebuilt
            }
            Some(_) => {
                tracing::warn!(
                    "Notes changed since the index was built; using the stale index ({} entries)",
                    self.len()
                );
                return Ok(BuildOutcome::Loaded);
            }
        };

        let entries = self.embed_chunks(chunks).await?;
        let meta = IndexMeta {
            model_id: Some(model_id),
            dimensions: Some(self.embedder.dimensions()),
            fingerprint: Some(fingerprint),
        };

        let db = self.db.clone();
        let records: Vec<StoredEntry> = entries.iter().map(StoredEntry::from_entry).collect();
        let meta_to_write = meta.clone();
        tokio::task::spawn_blocking(move || write_all(&db, &records, &meta_to_write))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        tracing::info!("Indexed {} chunks at {}", entries.len(), self.path.display());

        *self.entries.write() = entries;
        *self.meta.write() = meta;
        Ok(outcome)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<VectorEntry>> {
        let dimensions = self.embedder.dimensions();
        let mut entries = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "{} returned {} vectors for {} texts",
                    self.embedder.name(),
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                check_dimensions(&vector, dimensions)?;
                entries.push(VectorEntry {
                    chunk: chunk.clone(),
                    vector,
                });
            }

            tracing::debug!("Embedded batch {} ({} chunks so far)", batch_no + 1, entries.len());
        }

        Ok(entries)
    }

    /// Return up to `k` chunks most similar to `query`, best first
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        Ok(self.search_vector(&query_vector, k))
    }

    /// Exact cosine scan against a query vector
    pub fn search_vector(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }

        let entries = self.entries.read();
        let mut scored: Vec<(usize, f32)> = entries
            .par_iter()
            .enumerate()
            .map(|(idx, entry)| (idx, cosine_similarity(query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(idx, similarity)| SearchHit {
                chunk: entries[idx].chunk.clone(),
                similarity,
            })
            .collect()
    }

    /// Remove every entry, in memory and on disk
    pub fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(ENTRIES)?;
        txn.delete_table(META)?;
        txn.commit()?;

        self.entries.write().clear();
        *self.meta.write() = IndexMeta::default();
        tracing::info!("Cleared index at {}", self.path.display());
        Ok(())
    }
}

fn read_all(db: &Database) -> Result<(Vec<VectorEntry>, IndexMeta)> {
    let txn = db.begin_read()?;

    let mut meta = IndexMeta::default();
    match txn.open_table(META) {
        Ok(table) => {
            meta.model_id = table.get(META_MODEL_ID)?.map(|v| v.value().to_string());
            meta.dimensions = table
                .get(META_DIMENSIONS)?
                .and_then(|v| v.value().parse().ok());
            meta.fingerprint = table.get(META_FINGERPRINT)?.map(|v| v.value().to_string());
        }
        Err(TableError::TableDoesNotExist(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let mut entries = Vec::new();
    match txn.open_table(ENTRIES) {
        Ok(table) => {
            for item in table.iter()? {
                let (_, value) = item?;
                let (record, _): (StoredEntry, usize) =
                    bincode::serde::decode_from_slice(value.value(), bincode::config::standard())
                        .map_err(|e| Error::vector_db(format!("corrupt index entry: {}", e)))?;
                entries.push(record.into_entry()?);
            }
        }
        Err(TableError::TableDoesNotExist(_)) => {}
        Err(e) => return Err(e.into()),
    }

    Ok((entries, meta))
}

fn write_all(db: &Database, records: &[StoredEntry], meta: &IndexMeta) -> Result<()> {
    let txn = db.begin_write()?;
    txn.delete_table(ENTRIES)?;
    txn.delete_table(META)?;
    {
        let mut table = txn.open_table(ENTRIES)?;
        for (seq, record) in records.iter().enumerate() {
            let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())
                .map_err(|e| Error::vector_db(format!("failed to encode entry: {}", e)))?;
            table.insert(seq as u64, bytes.as_slice())?;
        }
    }
    {
        let mut table = txn.open_table(META)?;
        if let Some(model_id) = &meta.model_id {
            table.insert(META_MODEL_ID, model_id.as_str())?;
        }
        if let Some(dimensions) = meta.dimensions {
            table.insert(META_DIMENSIONS, dimensions.to_string().as_str())?;
        }
        if let Some(fingerprint) = &meta.fingerprint {
            table.insert(META_FINGERPRINT, fingerprint.as_str())?;
        }
        table.insert(META_BUILT_AT, chrono::Utc::now().to_rfc3339().as_str())?;
    }
    txn.commit()?;
    Ok(())
}
