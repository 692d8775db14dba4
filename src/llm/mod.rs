//! LLM completion clients.
//!
//! Same backend split as the embedding layer: Gemini or an OpenAI-compatible
//! endpoint, chosen once at startup. The synthesizer builds a single prompt
//! string and makes one completion call per answer.

mod gemini;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;

pub use gemini::GeminiClient;
pub use openai::OpenAiChatClient;

use crate::config::{AppConfig, ProviderBackend};
use crate::errors::ApiError;

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    /// One-shot completion of a fully assembled prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

pub fn from_config(config: &AppConfig) -> Result<Arc<dyn LlmClient>, ApiError> {
    match config.resolve_backend()? {
        ProviderBackend::Gemini => {
            let key = config
                .gemini_api_key
                .clone()
                .ok_or(ApiError::NoEmbeddingBackend)?;
            Ok(Arc::new(GeminiClient::new(
                config.models.gemini_base_url.clone(),
                config.models.gemini_chat_model.clone(),
                key,
                config.request_timeout_secs(),
            )?))
        }
        ProviderBackend::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or(ApiError::NoEmbeddingBackend)?;
            Ok(Arc::new(OpenAiChatClient::new(
                config.models.openai_base_url.clone(),
                config.models.openai_chat_model.clone(),
                key,
                config.request_timeout_secs(),
            )?))
        }
    }
}
