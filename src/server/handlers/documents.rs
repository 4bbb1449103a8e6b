use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    pub filename: String,
    /// Pre-extracted page text; PDF extraction happens upstream.
    pub pages: Vec<String>,
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<UploadDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    if payload.pages.iter().all(|page| page.trim().is_empty()) {
        return Err(ApiError::BadRequest(
            "document contains no extractable text".to_string(),
        ));
    }

    let document = state
        .ingest_document(&session_id, &payload.filename, &payload.pages)
        .await?;

    Ok(Json(json!({ "document": document })))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    let documents = state.store.list_documents(&session_id).await?;
    Ok(Json(json!({ "documents": documents })))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state
        .store
        .delete_document(&document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("document not found".to_string()))?;

    // The remaining set defines the index; an empty set discards it.
    state.rebuild_index(&session_id).await?;

    Ok(Json(json!({ "success": true })))
}
