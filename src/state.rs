use std::sync::Arc;

use crate::answer::AnswerSynthesizer;
use crate::config::{AppConfig, AppPaths};
use crate::embeddings;
use crate::errors::ApiError;
use crate::history::ConversationStore;
use crate::index::SqliteVectorIndex;
use crate::ingest::DocumentNormalizer;
use crate::llm;
use crate::prompts::PromptStore;
use crate::service::RagService;

/// Shared application state: configuration plus the assembled pipeline.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub service: Arc<RagService>,
    pub prompts: Arc<PromptStore>,
}

impl AppState {
    /// Wires up stores and providers.
    ///
    /// Fails fast when no embedding backend is configured or a database
    /// cannot be opened; a corrupt index file surfaces here, and the
    /// recovery is to delete it and re-ingest.
    pub async fn initialize() -> Result<Arc<Self>, ApiError> {
        let paths = Arc::new(AppPaths::new());
        let config = AppConfig::load(&paths)?;

        let embeddings = embeddings::from_config(&config)?;
        let llm = llm::from_config(&config)?;
        tracing::info!(backend = embeddings.name(), "provider backend resolved");

        let index = Arc::new(SqliteVectorIndex::open(paths.index_db_path.clone()).await?);
        let memory = Arc::new(ConversationStore::new(paths.chat_db_path.clone()).await?);
        let prompts = Arc::new(PromptStore::new(paths.chat_db_path.clone()).await?);

        let normalizer = DocumentNormalizer::new(
            paths.upload_dir.clone(),
            config.request_timeout_secs(),
        )?;
        let synthesizer = AnswerSynthesizer::new(
            llm,
            prompts.clone(),
            memory.clone(),
            config.history_limit(),
        );

        let service = Arc::new(RagService::new(
            config,
            normalizer,
            embeddings,
            index,
            synthesizer,
            memory,
        ));

        Ok(Arc::new(Self {
            paths,
            service,
            prompts,
        }))
    }
}
