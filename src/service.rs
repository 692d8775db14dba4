//! Pipeline orchestration.
//!
//! Ingestion path: normalize -> chunk -> embed -> index.
//! Query path: retrieve -> synthesize -> record turn.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::answer::AnswerSynthesizer;
use crate::config::AppConfig;
use crate::embeddings::EmbeddingProvider;
use crate::errors::ApiError;
use crate::history::{ConversationStore, ConversationTurn};
use crate::index::{chunk_id, ChunkRecord, DeleteOutcome, DocumentMeta, VectorIndex};
use crate::ingest::{chunker, title_key, Document, DocumentNormalizer};
use crate::retriever::{Reference, Retriever};

/// Summary of one ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub title: String,
    pub origin: String,
    pub chunks: usize,
}

/// Answer plus the provenance it was grounded on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskOutcome {
    pub answer: String,
    pub references: Vec<Reference>,
}

pub struct RagService {
    config: AppConfig,
    normalizer: DocumentNormalizer,
    embeddings: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    memory: Arc<ConversationStore>,
}

impl RagService {
    pub fn new(
        config: AppConfig,
        normalizer: DocumentNormalizer,
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        synthesizer: AnswerSynthesizer,
        memory: Arc<ConversationStore>,
    ) -> Self {
        let retriever = Retriever::new(embeddings.clone(), index.clone());
        Self {
            config,
            normalizer,
            embeddings,
            index,
            retriever,
            synthesizer,
            memory,
        }
    }

    pub async fn ingest_file(
        &self,
        filename: &str,
        bytes: &[u8],
        title: Option<&str>,
    ) -> Result<IngestReport, ApiError> {
        if filename.trim().is_empty() {
            return Err(ApiError::BadRequest("filename is required".to_string()));
        }

        let document = self.normalizer.normalize_file(filename, bytes, title).await?;
        self.ingest_document(document).await
    }

    pub async fn ingest_url(
        &self,
        title: Option<&str>,
        url: &str,
    ) -> Result<IngestReport, ApiError> {
        let document = self.normalizer.normalize_url(title, url).await?;
        self.ingest_document(document).await
    }

    /// Chunks, embeds, and stores one normalized document. Embedding happens
    /// before the index transaction opens, so a service failure leaves the
    /// index untouched.
    async fn ingest_document(&self, document: Document) -> Result<IngestReport, ApiError> {
        let chunks = chunker::split(
            &document.body,
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        );
        if chunks.is_empty() {
            return Err(ApiError::EmptyDocument);
        }

        let embeddings = self.embeddings.embed_batch(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::Service(format!(
                "embedding backend returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let key = title_key(&document.title);
        let records: Vec<(ChunkRecord, Vec<f32>)> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| {
                (
                    ChunkRecord {
                        id: chunk_id(&key, i),
                        text,
                        source_title: document.title.clone(),
                        source_origin: document.origin.clone(),
                        sequence_index: i as i64,
                    },
                    embedding,
                )
            })
            .collect();

        let meta = DocumentMeta {
            title: document.title.clone(),
            origin: document.origin.clone(),
        };
        let stored = records.len();
        self.index.add_document(&key, &meta, records).await?;

        tracing::info!(
            title = %document.title,
            origin = %document.origin,
            chunks = stored,
            "document ingested"
        );

        Ok(IngestReport {
            title: document.title,
            origin: document.origin,
            chunks: stored,
        })
    }

    /// Full query path for one question.
    pub async fn ask(
        &self,
        conversation_id: &str,
        question: &str,
        k: Option<usize>,
        score_threshold: Option<f32>,
    ) -> Result<AskOutcome, ApiError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ApiError::BadRequest("question is required".to_string()));
        }
        if self.memory.get_conversation(conversation_id).await?.is_none() {
            return Err(ApiError::NotFound(format!(
                "unknown conversation: {conversation_id}"
            )));
        }

        let k = k.unwrap_or(self.config.retrieval.top_k);
        let threshold = score_threshold.unwrap_or(self.config.retrieval.score_threshold);

        let context = self.retriever.retrieve(question, k, threshold).await?;
        if context.is_no_information() {
            tracing::info!(conversation_id, "no relevant context, answering from history");
        }

        let answer = self
            .synthesizer
            .answer(conversation_id, question, &context)
            .await?;

        Ok(AskOutcome {
            answer,
            references: context.references,
        })
    }

    pub async fn start_conversation(&self, title: Option<String>) -> Result<String, ApiError> {
        self.memory.create_conversation(title).await
    }

    pub async fn history(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ConversationTurn>, ApiError> {
        self.memory.recent(conversation_id, limit).await
    }

    /// Deletes a document by its (case-insensitive, extension-stripped)
    /// title.
    pub async fn delete_document(&self, title: &str) -> Result<DeleteOutcome, ApiError> {
        if title.trim().is_empty() {
            return Err(ApiError::BadRequest("title is required".to_string()));
        }
        self.index.delete_by_title(&title_key(title)).await
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentMeta>, ApiError> {
        self.index.all_metadata().await
    }
}
