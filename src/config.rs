use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

/// Filesystem layout for runtime data.
///
/// Everything lives under one data directory so a broken index can be
/// recovered by deleting it and re-ingesting (the index is a derived cache,
/// not a source of truth).
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub index_db_path: PathBuf,
    pub chat_db_path: PathBuf,
    pub upload_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        Self::at(data_dir)
    }

    /// Builds the layout rooted at an explicit directory. Used directly by
    /// tests with a temp dir.
    pub fn at(data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        let index_db_path = data_dir.join("ragline_index.db");
        let chat_db_path = data_dir.join("ragline_chat.db");
        let upload_dir = data_dir.join("uploads");

        for dir in [&data_dir, &log_dir, &upload_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            index_db_path,
            chat_db_path,
            upload_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("RAGLINE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Ragline");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Ragline");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("ragline")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Which cloud provider backs embeddings and chat.
///
/// Resolved once at startup from available credentials; runtime code never
/// branches on optional keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderBackend {
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub gemini_embedding_model: String,
    pub gemini_chat_model: String,
    pub openai_embedding_model: String,
    pub openai_chat_model: String,
    pub gemini_base_url: String,
    pub openai_base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            gemini_embedding_model: "text-embedding-004".to_string(),
            gemini_chat_model: "gemini-1.5-flash".to_string(),
            openai_embedding_model: "text-embedding-3-small".to_string(),
            openai_chat_model: "gpt-4o-mini".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub models: ModelConfig,
    /// Outbound request timeout in seconds for embedding/LLM calls.
    pub request_timeout_secs: Option<u64>,
    /// Chat turns injected into the prompt.
    pub history_limit: Option<i64>,
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
}

impl AppConfig {
    /// Loads `config.yml` from the data dir when present, then overlays
    /// credentials from the environment.
    pub fn load(paths: &AppPaths) -> Result<Self, ApiError> {
        let path = paths.data_dir.join("config.yml");
        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(ApiError::internal)?;
            serde_yaml::from_str::<AppConfig>(&raw)
                .map_err(|e| ApiError::Internal(format!("invalid config.yml: {e}")))?
        } else {
            AppConfig::default()
        };

        config.gemini_api_key = non_empty_env("GEMINI_API_KEY");
        config.openai_api_key = non_empty_env("OPENAI_API_KEY");
        Ok(config)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs.unwrap_or(30)
    }

    pub fn history_limit(&self) -> i64 {
        self.history_limit.unwrap_or(10)
    }

    /// Picks the provider backend from configured credentials, failing fast
    /// when neither is available.
    pub fn resolve_backend(&self) -> Result<ProviderBackend, ApiError> {
        if self.gemini_api_key.is_some() {
            Ok(ProviderBackend::Gemini)
        } else if self.openai_api_key.is_some() {
            Ok(ProviderBackend::OpenAi)
        } else {
            Err(ApiError::NoEmbeddingBackend)
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_ingestion_policy() {
        let config = AppConfig::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.score_threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn backend_resolution_prefers_gemini_and_fails_fast() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.resolve_backend(),
            Err(ApiError::NoEmbeddingBackend)
        ));

        config.openai_api_key = Some("sk-test".to_string());
        assert_eq!(config.resolve_backend().unwrap(), ProviderBackend::OpenAi);

        config.gemini_api_key = Some("g-test".to_string());
        assert_eq!(config.resolve_backend().unwrap(), ProviderBackend::Gemini);
    }
}
