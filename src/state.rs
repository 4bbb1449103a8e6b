use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::config::{AppConfig, AppPaths};
use crate::core::errors::ApiError;
use crate::index::{HttpEmbeddingClient, VectorIndexManager};
use crate::llm::HttpLlmClient;
use crate::memory::ConversationMemoryCache;
use crate::rag::{QueryPipeline, RetrievalEngine};
use crate::search::SearchClient;
use crate::store::{Document, SessionStore};
use crate::tools::executor::ToolExecutor;

pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub store: SessionStore,
    pub indices: Arc<VectorIndexManager>,
    pub memory: Arc<ConversationMemoryCache>,
    pub pipeline: QueryPipeline,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let config = AppConfig::load(&paths)?;

        let store = SessionStore::new(paths.db_path.clone()).await?;
        let embedder = Arc::new(HttpEmbeddingClient::new(&config.embedding)?);
        let indices = Arc::new(VectorIndexManager::new(paths.index_dir.clone(), embedder));
        let memory = Arc::new(ConversationMemoryCache::new(store.clone()));

        let llm = Arc::new(HttpLlmClient::new(&config.llm)?);
        let search = Arc::new(SearchClient::new(&config.search)?);
        let engine = RetrievalEngine::new(store.clone(), indices.clone(), memory.clone());
        let pipeline = QueryPipeline::new(
            store.clone(),
            engine,
            search,
            ToolExecutor::new()?,
            llm,
            config.search.max_results,
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            store,
            indices,
            memory,
            pipeline,
            started_at: Utc::now(),
        }))
    }

    /// Persists a document, then rebuilds the session's index wholesale from
    /// the complete accumulated set.
    pub async fn ingest_document(
        &self,
        session_id: &str,
        filename: &str,
        pages: &[String],
    ) -> Result<Document, ApiError> {
        let document = self.store.add_document(session_id, filename, pages).await?;
        self.rebuild_index(session_id).await?;
        Ok(document)
    }

    /// Rebuilds (or discards, when no documents remain) the session's index.
    pub async fn rebuild_index(&self, session_id: &str) -> Result<usize, ApiError> {
        let accumulated = self.store.accumulated_documents(session_id).await?;
        if accumulated.is_empty() {
            self.indices.discard(session_id).await;
            return Ok(0);
        }
        self.indices.rebuild(session_id, accumulated).await
    }

    /// Drops all derived per-session state; used on session deletion after
    /// the store cascade.
    pub async fn purge_session_state(&self, session_id: &str) {
        self.indices.discard(session_id).await;
        self.memory.forget(session_id).await;
    }
}
