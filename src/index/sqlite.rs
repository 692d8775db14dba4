//! SQLite-backed vector index.
//!
//! Metadata and little-endian f32 embedding blobs live in one database;
//! search is brute-force cosine over the stored rows. WAL mode lets
//! searches read a consistent snapshot while a write is in flight, and a
//! single writer lock serializes ingestion against deletion.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::{ChunkRecord, DeleteOutcome, DocumentMeta, SearchHit, VectorIndex};
use crate::errors::ApiError;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorIndex {
    /// Opens (or bootstraps) the index at the given path. An absent file is
    /// a valid empty index; a corrupted file fails here, loudly, and the
    /// recovery is to delete it and re-ingest.
    pub async fn open(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::Internal(format!("cannot open vector index: {e}")))?;

        let index = Self {
            pool,
            write_lock: Mutex::new(()),
            db_path,
        };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                title_key TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                origin TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                title_key TEXT NOT NULL,
                title TEXT NOT NULL,
                origin TEXT NOT NULL,
                sequence_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_title_key ON chunks(title_key)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
        ChunkRecord {
            id: row.get("chunk_id"),
            text: row.get("content"),
            source_title: row.get("title"),
            source_origin: row.get("origin"),
            sequence_index: row.get("sequence_index"),
        }
    }

    /// The whole index shares one embedding dimensionality; the first write
    /// pins it and later writes must match.
    async fn check_dimension(&self, dimension: usize) -> Result<(), ApiError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dimension'")
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        match stored.and_then(|v| v.parse::<usize>().ok()) {
            Some(existing) if existing != dimension => Err(ApiError::BadRequest(format!(
                "embedding dimension {dimension} does not match index dimension {existing}"
            ))),
            Some(_) => Ok(()),
            None => {
                sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimension', ?1)")
                    .bind(dimension.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(ApiError::internal)?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add_document(
        &self,
        title_key: &str,
        meta: &DocumentMeta,
        records: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        if records.is_empty() {
            return Err(ApiError::EmptyDocument);
        }

        let _guard = self.write_lock.lock().await;

        if let Some((_, first)) = records.first() {
            self.check_dimension(first.len()).await?;
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        // Replace-on-reingest: drop whatever was stored under this title.
        sqlx::query("DELETE FROM chunks WHERE title_key = ?1")
            .bind(title_key)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("INSERT OR REPLACE INTO documents (title_key, title, origin) VALUES (?1, ?2, ?3)")
            .bind(title_key)
            .bind(&meta.title)
            .bind(&meta.origin)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for (chunk, embedding) in &records {
            let blob = Self::serialize_embedding(embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO chunks
                     (chunk_id, title_key, title, origin, sequence_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&chunk.id)
            .bind(title_key)
            .bind(&chunk.source_title)
            .bind(&chunk.source_origin)
            .bind(chunk.sequence_index)
            .bind(&chunk.text)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, title, origin, sequence_index, content, embedding
             FROM chunks ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = Self::cosine_similarity(query_embedding, &stored);
                if score < score_threshold {
                    return None;
                }
                Some(SearchHit {
                    chunk: Self::row_to_chunk(row),
                    score,
                })
            })
            .collect();

        // Stable sort keeps equal-score hits in storage order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn delete_by_title(&self, title_key: &str) -> Result<DeleteOutcome, ApiError> {
        let _guard = self.write_lock.lock().await;

        // Two separate statements: if the metadata delete fails after the
        // chunk delete succeeded, the caller sees the divergence and can
        // retry the metadata side alone.
        let chunks_deleted = sqlx::query("DELETE FROM chunks WHERE title_key = ?1")
            .bind(title_key)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?
            .rows_affected() as usize;

        let doc_result = sqlx::query("DELETE FROM documents WHERE title_key = ?1")
            .bind(title_key)
            .execute(&self.pool)
            .await;

        match doc_result {
            Ok(result) => {
                if chunks_deleted == 0 && result.rows_affected() == 0 {
                    Ok(DeleteOutcome::NotFound)
                } else {
                    Ok(DeleteOutcome::Deleted {
                        chunks: chunks_deleted,
                    })
                }
            }
            Err(err) if chunks_deleted > 0 => Err(ApiError::Partial {
                metadata_deleted: false,
                vectors_deleted: true,
                detail: format!("vectors removed but metadata deletion failed: {err}"),
            }),
            Err(err) => Err(ApiError::internal(err)),
        }
    }

    async fn all_metadata(&self) -> Result<Vec<DocumentMeta>, ApiError> {
        let rows = sqlx::query("SELECT title, origin FROM documents ORDER BY created_at, title_key")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| DocumentMeta {
                title: row.get("title"),
                origin: row.get("origin"),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::chunk_id;

    async fn test_index() -> (SqliteVectorIndex, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteVectorIndex::open(dir.path().join("index.db"))
            .await
            .unwrap();
        (index, dir)
    }

    fn record(title_key: &str, title: &str, seq: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            id: chunk_id(title_key, seq),
            text: text.to_string(),
            source_title: title.to_string(),
            source_origin: format!("file://{title}"),
            sequence_index: seq as i64,
        }
    }

    fn doc(title: &str) -> DocumentMeta {
        DocumentMeta {
            title: title.to_string(),
            origin: format!("file://{title}"),
        }
    }

    #[tokio::test]
    async fn add_and_search() {
        let (index, _dir) = test_index().await;

        index
            .add_document(
                "doc1",
                &doc("Doc1"),
                vec![
                    (record("doc1", "Doc1", 0, "rust memory"), vec![1.0, 0.0, 0.0]),
                    (record("doc1", "Doc1", 1, "cooking pasta"), vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 2);

        let hits = index.search(&[1.0, 0.0, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "rust memory");
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn search_orders_by_descending_score_and_honors_threshold() {
        let (index, _dir) = test_index().await;

        index
            .add_document(
                "doc1",
                &doc("Doc1"),
                vec![
                    (record("doc1", "Doc1", 0, "weak"), vec![0.3, 1.0, 0.0]),
                    (record("doc1", "Doc1", 1, "strong"), vec![1.0, 0.1, 0.0]),
                    (record("doc1", "Doc1", 2, "medium"), vec![1.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(hits[0].chunk.text, "strong");

        let filtered = index.search(&[1.0, 0.0, 0.0], 10, 0.9).await.unwrap();
        assert_eq!(filtered.len(), 1);
        for hit in &filtered {
            assert!(hit.score >= 0.9);
        }
    }

    #[tokio::test]
    async fn unrelated_query_returns_empty_not_filler() {
        let (index, _dir) = test_index().await;

        index
            .add_document(
                "doc1",
                &doc("Doc1"),
                vec![(record("doc1", "Doc1", 0, "unrelated"), vec![0.0, 1.0, 0.0])],
            )
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 5, 0.9).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_by_title_reports_outcomes_distinctly() {
        let (index, _dir) = test_index().await;

        index
            .add_document(
                "doc1",
                &doc("Doc1"),
                vec![
                    (record("doc1", "Doc1", 0, "a"), vec![1.0, 0.0]),
                    (record("doc1", "Doc1", 1, "b"), vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let outcome = index.delete_by_title("doc1").await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted { chunks: 2 });
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.all_metadata().await.unwrap().is_empty());

        // Second delete of the same title is not-found, not a false success.
        let outcome = index.delete_by_title("doc1").await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn reingest_replaces_previous_records() {
        let (index, _dir) = test_index().await;

        index
            .add_document(
                "doc1",
                &doc("Doc1"),
                vec![
                    (record("doc1", "Doc1", 0, "old a"), vec![1.0, 0.0]),
                    (record("doc1", "Doc1", 1, "old b"), vec![0.0, 1.0]),
                    (record("doc1", "Doc1", 2, "old c"), vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        index
            .add_document(
                "doc1",
                &doc("Doc1"),
                vec![(record("doc1", "Doc1", 0, "new a"), vec![1.0, 0.0])],
            )
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.search(&[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(hits[0].chunk.text, "new a");
        assert_eq!(index.all_metadata().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn survives_reopen_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        {
            let index = SqliteVectorIndex::open(path.clone()).await.unwrap();
            index
                .add_document(
                    "doc1",
                    &doc("Doc1"),
                    vec![(
                        record("doc1", "Doc1", 0, "persisted text"),
                        vec![0.25, -0.5, 0.75],
                    )],
                )
                .await
                .unwrap();
        }

        let reopened = SqliteVectorIndex::open(path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);

        let hits = reopened.search(&[0.25, -0.5, 0.75], 1, 0.9).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, chunk_id("doc1", 0));
        assert_eq!(hits[0].chunk.text, "persisted text");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn rejects_mismatched_dimension() {
        let (index, _dir) = test_index().await;

        index
            .add_document(
                "doc1",
                &doc("Doc1"),
                vec![(record("doc1", "Doc1", 0, "a"), vec![1.0, 0.0, 0.0])],
            )
            .await
            .unwrap();

        let err = index
            .add_document(
                "doc2",
                &doc("Doc2"),
                vec![(record("doc2", "Doc2", 0, "b"), vec![1.0, 0.0])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn metadata_is_document_level() {
        let (index, _dir) = test_index().await;

        index
            .add_document(
                "doc1",
                &doc("Doc1"),
                vec![
                    (record("doc1", "Doc1", 0, "a"), vec![1.0, 0.0]),
                    (record("doc1", "Doc1", 1, "b"), vec![0.0, 1.0]),
                    (record("doc1", "Doc1", 2, "c"), vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let metadata = index.all_metadata().await.unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].title, "Doc1");
    }
}
