//! Persistent vector index and similarity search

mod index;

pub use index::{corpus_fingerprint, BuildOutcome, VectorIndex, DEFAULT_TOP_K, INDEX_FILE};
