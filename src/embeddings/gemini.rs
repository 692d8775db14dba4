use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::EmbeddingProvider;
use crate::errors::ApiError;

/// Gemini `text-embedding-004` produces 768-dimensional vectors.
const GEMINI_EMBEDDING_DIM: usize = 768;

pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiEmbedder {
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
        timeout_secs: u64,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    fn embed_values(value: &Value) -> Result<Vec<f32>, ApiError> {
        let values = value
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ApiError::Service("malformed embedding response".to_string()))?;
        Ok(values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    fn name(&self) -> &str {
        "gemini"
    }

    fn dimension(&self) -> usize {
        GEMINI_EMBEDDING_DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::service)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Service(format!(
                "gemini embed failed ({status}): {text}"
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::service)?;
        let embedding = payload
            .get("embedding")
            .ok_or_else(|| ApiError::Service("missing embedding in response".to_string()))?;
        Self::embed_values(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url, self.model, self.api_key
        );
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();

        let res = self
            .client
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(ApiError::service)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Service(format!(
                "gemini batch embed failed ({status}): {text}"
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::service)?;
        let embeddings = payload
            .get("embeddings")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ApiError::Service("missing embeddings in response".to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(ApiError::Service(format!(
                "gemini returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }

        embeddings.iter().map(Self::embed_values).collect()
    }
}
