//! Conversation memory.
//!
//! Append-only record of question/answer turns keyed by conversation id.
//! Conversation ids are caller-supplied (created via `create_conversation`);
//! this store never invents them mid-query.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One completed question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub conversation_id: String,
    pub question: String,
    pub answer: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::Internal(format!("cannot open chat db: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id)")
            .execute(&pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(Self { pool })
    }

    pub async fn create_conversation(&self, title: Option<String>) -> Result<String, ApiError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&id)
        .bind(title)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(id)
    }

    pub async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationInfo>, ApiError> {
        let row = sqlx::query("SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.map(|row| ConversationInfo {
            id: row.get("id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn require_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM conversations WHERE id = ?1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        if exists.is_none() {
            return Err(ApiError::NotFound(format!(
                "unknown conversation: {conversation_id}"
            )));
        }
        Ok(())
    }

    /// Records one completed turn. Fails with NotFound for an id no
    /// `create_conversation` call ever issued.
    pub async fn append(
        &self,
        conversation_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<i64, ApiError> {
        self.require_conversation(conversation_id).await?;
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let result = sqlx::query(
            "INSERT INTO turns (conversation_id, question, answer, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(conversation_id)
        .bind(question)
        .bind(answer)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(result.last_insert_rowid())
    }

    /// Returns the most-recent-`limit` turns, oldest first within the
    /// window. A limit above the stored count returns everything.
    pub async fn recent(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ConversationTurn>, ApiError> {
        self.require_conversation(conversation_id).await?;

        let rows = if limit > 0 {
            sqlx::query(
                "SELECT * FROM (SELECT * FROM turns WHERE conversation_id = ?1 ORDER BY id DESC LIMIT ?2)
                 ORDER BY id ASC",
            )
            .bind(conversation_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query("SELECT * FROM turns WHERE conversation_id = ?1 ORDER BY id ASC")
                .bind(conversation_id)
                .fetch_all(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(rows
            .iter()
            .map(|row| ConversationTurn {
                id: row.get("id"),
                conversation_id: row.get("conversation_id"),
                question: row.get("question"),
                answer: row.get("answer"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (ConversationStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path().join("chat.db"))
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn append_and_recent_window() {
        let (store, _dir) = test_store().await;
        let id = store.create_conversation(None).await.unwrap();

        for i in 0..5 {
            store
                .append(&id, &format!("q{i}"), &format!("a{i}"))
                .await
                .unwrap();
        }

        let recent = store.recent(&id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        // Most-recent-3 window, oldest first inside it.
        assert_eq!(recent[0].question, "q2");
        assert_eq!(recent[2].question, "q4");
    }

    #[tokio::test]
    async fn limit_above_available_returns_all() {
        let (store, _dir) = test_store().await;
        let id = store.create_conversation(Some("t".to_string())).await.unwrap();

        store.append(&id, "q0", "a0").await.unwrap();
        let recent = store.recent(&id, 100).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let (store, _dir) = test_store().await;

        let err = store.recent("missing", 10).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = store.append("missing", "q", "a").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn turns_are_scoped_per_conversation() {
        let (store, _dir) = test_store().await;
        let a = store.create_conversation(None).await.unwrap();
        let b = store.create_conversation(None).await.unwrap();

        store.append(&a, "qa", "aa").await.unwrap();
        store.append(&b, "qb", "ab").await.unwrap();

        let turns = store.recent(&a, 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].question, "qa");
    }
}
