use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::rag::{ResolveOptions, RetrievalStrategy, StrategyParams};
use crate::state::AppState;
use crate::store::MessageRole;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub chunk_size: Option<u32>,
    #[serde(default)]
    pub chunk_overlap: Option<u32>,
    #[serde(default)]
    pub internet_first: bool,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .store
        .get_session(&payload.session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message is empty".to_string()));
    }

    let strategy = RetrievalStrategy::from_name(payload.strategy.as_deref().unwrap_or("contextual"));
    let options = ResolveOptions {
        strategy,
        params: StrategyParams {
            k: payload.k.unwrap_or(5),
            chunk_size: payload.chunk_size.unwrap_or(session.chunk_size),
            chunk_overlap: payload.chunk_overlap.unwrap_or(session.chunk_overlap),
        },
        internet_first: payload.internet_first,
    };

    state
        .store
        .add_message(&session.id, MessageRole::User, &payload.message, None)
        .await?;

    let answer = state
        .pipeline
        .resolve(&session, &payload.message, &options)
        .await;

    let message_id = state
        .store
        .add_message(
            &session.id,
            MessageRole::Assistant,
            &answer,
            Some(strategy.as_str()),
        )
        .await?;

    Ok(Json(json!({
        "message_id": message_id,
        "answer": answer,
        "strategy": strategy.as_str(),
    })))
}
