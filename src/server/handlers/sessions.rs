use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::llm::ModelConfig;
use crate::state::AppState;
use crate::store::SessionUpdate;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub chunk_size: Option<u32>,
    #[serde(default)]
    pub chunk_overlap: Option<u32>,
    #[serde(default)]
    pub internet_search_enabled: Option<bool>,
    #[serde(default)]
    pub model_config: Option<ModelConfig>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.store.list_sessions().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .store
        .create_session(
            &payload.name,
            payload.owner.as_deref().unwrap_or(""),
            payload.chunk_size.unwrap_or(1000),
            payload.chunk_overlap.unwrap_or(200),
            payload.internet_search_enabled.unwrap_or(false),
            payload.model_config.unwrap_or_default(),
        )
        .await?;

    Ok(Json(json!({ "session": session })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    let documents = state.store.list_documents(&session_id).await?;
    Ok(Json(json!({
        "session": session,
        "document_count": documents.len(),
    })))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<SessionUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.store.update_session(&session_id, payload).await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let existed = state.store.delete_session(&session_id).await?;
    if !existed {
        return Err(ApiError::NotFound("session not found".to_string()));
    }

    state.purge_session_state(&session_id).await;
    Ok(Json(json!({ "success": true })))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    let messages = state
        .store
        .recent_messages(&session_id, params.limit.unwrap_or(50))
        .await?;
    Ok(Json(json!({ "messages": messages })))
}
