use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the whole pipeline.
///
/// Validation, service, not-found and partial-failure outcomes are distinct
/// variants so callers (and the HTTP layer) can tell "no documents found"
/// apart from "service unavailable".
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("document produced no text")]
    EmptyDocument,
    #[error("fetch failed: {0}")]
    FetchError(String),
    #[error("no embedding backend configured")]
    NoEmbeddingBackend,
    #[error("service error: {0}")]
    Service(String),
    #[error("service timeout: {0}")]
    ServiceTimeout(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("partial deletion: {detail}")]
    Partial {
        metadata_deleted: bool,
        vectors_deleted: bool,
        detail: String,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    /// Maps a reqwest transport failure to timeout vs. generic service error.
    pub fn service(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::ServiceTimeout(err.to_string())
        } else {
            ApiError::Service(err.to_string())
        }
    }

    /// True for errors a caller may meaningfully retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Service(_) | ApiError::ServiceTimeout(_) | ApiError::EmptyDocument
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::UnsupportedFormat(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, json!({ "error": msg }))
            }
            ApiError::EmptyDocument => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": self.to_string() }),
            ),
            ApiError::FetchError(msg) => (StatusCode::BAD_GATEWAY, json!({ "error": msg })),
            ApiError::NoEmbeddingBackend => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string() }),
            ),
            ApiError::Service(msg) => (StatusCode::BAD_GATEWAY, json!({ "error": msg })),
            ApiError::ServiceTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::Partial {
                metadata_deleted,
                vectors_deleted,
                detail,
            } => (
                StatusCode::MULTI_STATUS,
                json!({
                    "error": detail,
                    "metadata_deleted": metadata_deleted,
                    "vectors_deleted": vectors_deleted,
                }),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}
