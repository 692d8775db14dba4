//! Vector index abstraction.
//!
//! A persistent nearest-neighbor store of (embedding, chunk, metadata)
//! records. The crate ships one implementation, `SqliteVectorIndex`; the
//! trait keeps the pipeline testable against in-memory doubles.

mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use sqlite::SqliteVectorIndex;

use crate::errors::ApiError;

/// A stored chunk of an ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable id derived from the normalized title and sequence index.
    pub id: String,
    pub text: String,
    pub source_title: String,
    pub source_origin: String,
    pub sequence_index: i64,
}

/// One similarity search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    /// Cosine similarity, higher is better.
    pub score: f32,
}

/// Document-level metadata, one entry per ingested source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    pub origin: String,
}

/// Result of a delete-by-title call. Not-found is an outcome, not an error;
/// the partial two-store divergence case travels as `ApiError::Partial`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { chunks: usize },
    NotFound,
}

/// Derives the stable record id for a chunk.
pub fn chunk_id(title_key: &str, sequence_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title_key.as_bytes());
    hasher.update(b"#");
    hasher.update(sequence_index.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Stores a document's chunk records, replacing any previous records
    /// under the same title key (idempotent re-ingestion).
    async fn add_document(
        &self,
        title_key: &str,
        meta: &DocumentMeta,
        records: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<(), ApiError>;

    /// Returns up to `k` hits with score >= `score_threshold`, ordered by
    /// descending similarity. Never pads with low-relevance filler.
    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, ApiError>;

    /// Removes every record stored under the given normalized title key.
    async fn delete_by_title(&self, title_key: &str) -> Result<DeleteOutcome, ApiError>;

    /// Document-level enumeration for administrative listing.
    async fn all_metadata(&self) -> Result<Vec<DocumentMeta>, ApiError>;

    /// Total stored chunk count.
    async fn count(&self) -> Result<usize, ApiError>;
}
