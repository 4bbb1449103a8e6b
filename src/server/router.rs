use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, documents, health, sessions, tools};
use crate::state::AppState;

/// Creates the application router: session/document/tool CRUD, chat history,
/// the chat message endpoint, and health.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/sessions/:session_id",
            get(sessions::get_session)
                .put(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:session_id/history",
            get(sessions::get_history),
        )
        .route(
            "/api/sessions/:session_id/documents",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route(
            "/api/documents/:document_id",
            delete(documents::delete_document),
        )
        .route(
            "/api/sessions/:session_id/tools",
            get(tools::list_tools).post(tools::create_tool),
        )
        .route("/api/tools/:tool_id", delete(tools::delete_tool))
        .route("/api/chat/message", post(chat::send_message))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
