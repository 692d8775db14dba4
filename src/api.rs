//! HTTP surface: thin glue over `RagService`.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::ApiError;
use crate::index::DeleteOutcome;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/conversations", post(create_conversation))
        .route("/api/chat/:conversation_id", post(ask).get(get_history))
        .route("/api/documents", get(list_documents))
        .route("/api/documents/url", post(ingest_url))
        .route("/api/documents/file", post(ingest_file))
        .route("/api/documents/:title", delete(delete_document))
        .route("/api/admin/prompts", get(list_prompts).post(create_prompt))
        .route(
            "/api/admin/prompts/:id",
            get(get_prompt).put(update_prompt),
        )
        .route("/api/admin/prompts/:id/activate", post(activate_prompt))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize, Default)]
struct CreateConversationRequest {
    title: Option<String>,
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<CreateConversationRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let title = payload.and_then(|Json(req)| req.title);
    let id = state.service.start_conversation(title).await?;
    Ok(Json(json!({ "conversation_id": id })))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    k: Option<usize>,
    score_threshold: Option<f32>,
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .service
        .ask(
            &conversation_id,
            &payload.question,
            payload.k,
            payload.score_threshold,
        )
        .await?;
    Ok(Json(json!({
        "answer": outcome.answer,
        "references": outcome.references,
    })))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let turns = state
        .service
        .history(&conversation_id, query.limit.unwrap_or(0))
        .await?;
    Ok(Json(json!({ "turns": turns })))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state.service.list_documents().await?;
    Ok(Json(json!({ "documents": documents })))
}

#[derive(Deserialize)]
struct UrlIngestRequest {
    title: Option<String>,
    url: String,
}

async fn ingest_url(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UrlIngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .service
        .ingest_url(payload.title.as_deref(), &payload.url)
        .await?;
    Ok(Json(json!({
        "title": report.title,
        "origin": report.origin,
        "chunks": report.chunks,
    })))
}

async fn ingest_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut filename = None;
    let mut bytes = None;
    let mut title = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().map(|n| n.to_string());
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("upload failed: {e}")))?,
                );
            }
            Some("title") => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("invalid title field: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::BadRequest("file field is required".to_string()))?;
    let filename =
        filename.ok_or_else(|| ApiError::BadRequest("uploaded file has no name".to_string()))?;

    let report = state
        .service
        .ingest_file(&filename, &bytes, title.as_deref())
        .await?;
    Ok(Json(json!({
        "title": report.title,
        "origin": report.origin,
        "chunks": report.chunks,
    })))
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(title): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.delete_document(&title).await? {
        DeleteOutcome::Deleted { chunks } => {
            Ok(Json(json!({ "deleted": true, "chunks": chunks })))
        }
        DeleteOutcome::NotFound => Err(ApiError::NotFound(format!(
            "no document titled '{title}'"
        ))),
    }
}

async fn list_prompts(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let prompts = state.prompts.list().await?;
    Ok(Json(json!({ "prompts": prompts })))
}

#[derive(Deserialize)]
struct CreatePromptRequest {
    name: String,
    text: String,
    created_by: String,
}

async fn create_prompt(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePromptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .prompts
        .create(&payload.name, &payload.text, &payload.created_by)
        .await?;
    Ok(Json(json!({ "id": id })))
}

async fn get_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let prompt = state.prompts.get(id).await?;
    Ok(Json(json!({ "prompt": prompt })))
}

#[derive(Deserialize)]
struct UpdatePromptRequest {
    text: Option<String>,
    updated_by: Option<String>,
}

async fn update_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePromptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .prompts
        .update(id, payload.text.as_deref(), payload.updated_by.as_deref())
        .await?;
    Ok(Json(json!({ "updated": true })))
}

async fn activate_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.prompts.activate(id).await?;
    Ok(Json(json!({ "activated": id })))
}
