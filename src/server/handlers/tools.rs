use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;
use crate::store::NewTool;

pub async fn create_tool(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<NewTool>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    let tool = state.store.create_tool(&session_id, payload).await?;
    Ok(Json(json!({ "tool": tool })))
}

pub async fn list_tools(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    let tools = state.store.list_tools(&session_id).await?;
    Ok(Json(json!({ "tools": tools })))
}

pub async fn delete_tool(
    State(state): State<Arc<AppState>>,
    Path(tool_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.delete_tool(&tool_id).await? {
        return Err(ApiError::NotFound("tool not found".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}
