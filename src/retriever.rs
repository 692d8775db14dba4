//! Retrieval: question embedding, similarity search, context assembly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingProvider;
use crate::errors::ApiError;
use crate::index::VectorIndex;

/// Provenance entry for one retrieved chunk's source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub origin: String,
    pub relevance_score: f32,
}

/// Retrieved context plus per-chunk provenance, assembled per query and
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub text: String,
    pub references: Vec<Reference>,
}

impl RetrievedContext {
    /// Stable marker for "nothing relevant was retrieved". Checked by
    /// identity via [`is_no_information`](Self::is_no_information), never
    /// shown to end users.
    pub const NO_INFORMATION: &'static str = "[no-relevant-context]";

    pub fn no_information() -> Self {
        Self {
            text: Self::NO_INFORMATION.to_string(),
            references: Vec::new(),
        }
    }

    pub fn is_no_information(&self) -> bool {
        self.references.is_empty() && self.text == Self::NO_INFORMATION
    }
}

pub struct Retriever {
    embeddings: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embeddings, index }
    }

    /// Embeds the question, searches the index, and assembles the context.
    /// Zero hits yield the no-information sentinel with empty references.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<RetrievedContext, ApiError> {
        let query_embedding = self.embeddings.embed(question).await?;
        let hits = self.index.search(&query_embedding, k, score_threshold).await?;

        if hits.is_empty() {
            return Ok(RetrievedContext::no_information());
        }

        let mut text = String::new();
        let mut references = Vec::with_capacity(hits.len());

        for (i, hit) in hits.iter().enumerate() {
            text.push_str(&format!(
                "[{}] (Source: {}, {}, relevance: {:.2})\n{}\n\n",
                i + 1,
                hit.chunk.source_title,
                hit.chunk.source_origin,
                hit.score,
                hit.chunk.text,
            ));
            references.push(Reference {
                title: hit.chunk.source_title.clone(),
                origin: hit.chunk.source_origin.clone(),
                relevance_score: hit.score,
            });
        }

        Ok(RetrievedContext {
            text: text.trim().to_string(),
            references,
        })
    }
}
