//! Instruction prompt store.
//!
//! At most one prompt is active at a time; activation flips the previous
//! active row off in the same transaction. A missing active prompt falls
//! back to `DEFAULT_INSTRUCTION`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::errors::ApiError;

pub const DEFAULT_INSTRUCTION: &str = "You are an assistant for question-answering tasks. \
Use the retrieved context to answer the question. \
If you don't know the answer, just say that you don't know.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: i64,
    pub name: String,
    pub text: String,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct PromptStore {
    pool: SqlitePool,
}

impl PromptStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::Internal(format!("cannot open prompt db: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS llm_prompts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                text TEXT NOT NULL,
                created_by TEXT NOT NULL,
                updated_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                is_active INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(Self { pool })
    }

    pub async fn create(
        &self,
        name: &str,
        text: &str,
        created_by: &str,
    ) -> Result<i64, ApiError> {
        if name.trim().is_empty() || text.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "prompt name and text are required".to_string(),
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO llm_prompts (name, text, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(name)
        .bind(text)
        .bind(created_by)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE") {
                ApiError::BadRequest(format!("prompt name already exists: {name}"))
            } else {
                ApiError::internal(e)
            }
        })?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list(&self) -> Result<Vec<PromptRecord>, ApiError> {
        let rows = sqlx::query("SELECT * FROM llm_prompts ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(rows.iter().map(Self::row_to_prompt).collect())
    }

    pub async fn get(&self, id: i64) -> Result<PromptRecord, ApiError> {
        let row = sqlx::query("SELECT * FROM llm_prompts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        row.as_ref()
            .map(Self::row_to_prompt)
            .ok_or_else(|| ApiError::NotFound(format!("prompt not found: {id}")))
    }

    pub async fn update(
        &self,
        id: i64,
        text: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<(), ApiError> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE llm_prompts
             SET text = COALESCE(?1, text), updated_by = COALESCE(?2, updated_by), updated_at = ?3
             WHERE id = ?4",
        )
        .bind(text)
        .bind(updated_by)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("prompt not found: {id}")));
        }
        Ok(())
    }

    /// Activates one prompt; every other prompt is deactivated in the same
    /// transaction so exactly one row is active afterwards.
    pub async fn activate(&self, id: i64) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("UPDATE llm_prompts SET is_active = 0")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let result = sqlx::query("UPDATE llm_prompts SET is_active = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        if result.rows_affected() == 0 {
            // Roll back so a bad id cannot leave zero prompts active when
            // one was active before.
            tx.rollback().await.map_err(ApiError::internal)?;
            return Err(ApiError::NotFound(format!("prompt not found: {id}")));
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// The currently active instruction text, if any prompt is active.
    pub async fn active_instruction(&self) -> Result<Option<String>, ApiError> {
        let text: Option<String> =
            sqlx::query_scalar("SELECT text FROM llm_prompts WHERE is_active = 1 LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        Ok(text)
    }

    fn row_to_prompt(row: &sqlx::sqlite::SqliteRow) -> PromptRecord {
        PromptRecord {
            id: row.get("id"),
            name: row.get("name"),
            text: row.get("text"),
            created_by: row.get("created_by"),
            updated_by: row.get("updated_by"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            is_active: row.get::<i64, _>("is_active") != 0,
        }
    }
}
