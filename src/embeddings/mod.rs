//! Embedding provider abstraction.
//!
//! Two interchangeable HTTP backends (Gemini and OpenAI-compatible); the
//! active one is picked once at startup from configured credentials. The
//! vector index is the cache of embeddings, so no caching happens here.

mod gemini;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;

pub use gemini::GeminiEmbedder;
pub use openai::OpenAiEmbedder;

use crate::config::{AppConfig, ProviderBackend};
use crate::errors::ApiError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Output dimensionality, constant for the life of the provider.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Builds the configured embedding backend, failing fast when no credentials
/// are present.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>, ApiError> {
    match config.resolve_backend()? {
        ProviderBackend::Gemini => {
            let key = config
                .gemini_api_key
                .clone()
                .ok_or(ApiError::NoEmbeddingBackend)?;
            Ok(Arc::new(GeminiEmbedder::new(
                config.models.gemini_base_url.clone(),
                config.models.gemini_embedding_model.clone(),
                key,
                config.request_timeout_secs(),
            )?))
        }
        ProviderBackend::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or(ApiError::NoEmbeddingBackend)?;
            Ok(Arc::new(OpenAiEmbedder::new(
                config.models.openai_base_url.clone(),
                config.models.openai_embedding_model.clone(),
                key,
                config.request_timeout_secs(),
            )?))
        }
    }
}
