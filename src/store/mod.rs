//! Session store — source of truth for sessions, documents, messages, and
//! the per-session tool catalog.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::llm::ModelConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub internet_search_enabled: bool,
    pub model_config: ModelConfig,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionUpdate {
    pub name: Option<String>,
    pub chunk_size: Option<u32>,
    pub chunk_overlap: Option<u32>,
    pub internet_search_enabled: Option<bool>,
    pub model_config: Option<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub session_id: String,
    pub filename: String,
    pub page_count: usize,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "assistant" | "ai" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub rag_strategy: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Api,
    PythonFunction,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Api => "api",
            ToolKind::PythonFunction => "python_function",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "api" => Some(ToolKind::Api),
            "python_function" => Some(ToolKind::PythonFunction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub kind: ToolKind,
    pub api_url: Option<String>,
    pub http_method: Option<String>,
    pub function_code: Option<String>,
    pub description: Option<String>,
    pub params_doc: Option<String>,
    pub returns_doc: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTool {
    pub name: String,
    pub kind: ToolKind,
    pub api_url: Option<String>,
    pub http_method: Option<String>,
    pub function_code: Option<String>,
    pub description: Option<String>,
    pub params_doc: Option<String>,
    pub returns_doc: Option<String>,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::internal(format!("failed to open session db: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner TEXT NOT NULL DEFAULT '',
                chunk_size INTEGER NOT NULL DEFAULT 1000,
                chunk_overlap INTEGER NOT NULL DEFAULT 200,
                internet_search_enabled INTEGER NOT NULL DEFAULT 0,
                model_config TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                pages TEXT NOT NULL DEFAULT '[]',
                uploaded_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                rag_strategy TEXT,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tools (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                name TEXT NOT NULL,
                tool_type TEXT NOT NULL,
                api_url TEXT,
                http_method TEXT,
                function_code TEXT,
                description TEXT,
                params_doc TEXT,
                returns_doc TEXT,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_documents_session ON documents(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_tools_session ON tools(session_id)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        }

        Ok(())
    }

    pub async fn create_session(
        &self,
        name: &str,
        owner: &str,
        chunk_size: u32,
        chunk_overlap: u32,
        internet_search_enabled: bool,
        model_config: ModelConfig,
    ) -> Result<Session, ApiError> {
        if chunk_size == 0 {
            return Err(ApiError::BadRequest("chunk_size must be positive".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let model_json = serde_json::to_string(&model_config).map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO sessions
                (id, name, owner, chunk_size, chunk_overlap, internet_search_enabled, model_config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        )
        .bind(&id)
        .bind(name)
        .bind(owner)
        .bind(chunk_size as i64)
        .bind(chunk_overlap as i64)
        .bind(internet_search_enabled as i64)
        .bind(&model_json)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        self.get_session(&id)
            .await?
            .ok_or_else(|| ApiError::Internal("session vanished after insert".to_string()))
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, ApiError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(Self::row_to_session))
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::row_to_session).collect())
    }

    pub async fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Session, ApiError> {
        let mut session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

        if let Some(name) = update.name {
            session.name = name;
        }
        if let Some(size) = update.chunk_size {
            if size == 0 {
                return Err(ApiError::BadRequest("chunk_size must be positive".to_string()));
            }
            session.chunk_size = size;
        }
        if let Some(overlap) = update.chunk_overlap {
            session.chunk_overlap = overlap;
        }
        if let Some(enabled) = update.internet_search_enabled {
            session.internet_search_enabled = enabled;
        }
        if let Some(model_config) = update.model_config {
            session.model_config = model_config;
        }

        let now = chrono::Utc::now().to_rfc3339();
        let model_json = serde_json::to_string(&session.model_config).map_err(ApiError::internal)?;

        sqlx::query(
            "UPDATE sessions SET name = ?1, chunk_size = ?2, chunk_overlap = ?3,
                internet_search_enabled = ?4, model_config = ?5, updated_at = ?6
             WHERE id = ?7",
        )
        .bind(&session.name)
        .bind(session.chunk_size as i64)
        .bind(session.chunk_overlap as i64)
        .bind(session.internet_search_enabled as i64)
        .bind(&model_json)
        .bind(&now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        session.updated_at = now;
        Ok(session)
    }

    /// Deletes the session row; documents, messages, and tools cascade.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn add_document(
        &self,
        session_id: &str,
        filename: &str,
        pages: &[String],
    ) -> Result<Document, ApiError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let pages_json = serde_json::to_string(pages).map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO documents (id, session_id, filename, pages, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(filename)
        .bind(&pages_json)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(Document {
            id,
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            page_count: pages.len(),
            uploaded_at: now,
        })
    }

    pub async fn list_documents(&self, session_id: &str) -> Result<Vec<Document>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, session_id, filename, pages, uploaded_at
             FROM documents WHERE session_id = ?1 ORDER BY uploaded_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| {
                let pages_json: String = row.get("pages");
                let pages: Vec<String> = serde_json::from_str(&pages_json).unwrap_or_default();
                Document {
                    id: row.get("id"),
                    session_id: row.get("session_id"),
                    filename: row.get("filename"),
                    page_count: pages.len(),
                    uploaded_at: row.get("uploaded_at"),
                }
            })
            .collect())
    }

    /// Returns the owning session id when the document existed.
    pub async fn delete_document(&self, document_id: &str) -> Result<Option<String>, ApiError> {
        let session_id: Option<String> =
            sqlx::query_scalar("SELECT session_id FROM documents WHERE id = ?1")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        if session_id.is_some() {
            sqlx::query("DELETE FROM documents WHERE id = ?1")
                .bind(document_id)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        }

        Ok(session_id)
    }

    /// Full accumulated page text for a session, in upload order.
    pub async fn accumulated_documents(&self, session_id: &str) -> Result<Vec<String>, ApiError> {
        let rows = sqlx::query(
            "SELECT pages FROM documents WHERE session_id = ?1 ORDER BY uploaded_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut texts = Vec::new();
        for row in rows {
            let pages_json: String = row.get("pages");
            let pages: Vec<String> = serde_json::from_str(&pages_json).unwrap_or_default();
            texts.extend(pages);
        }
        Ok(texts)
    }

    pub async fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        rag_strategy: Option<&str>,
    ) -> Result<i64, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let result = sqlx::query(
            "INSERT INTO messages (session_id, role, content, rag_strategy, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(rag_strategy)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    /// Last `limit` messages in chronological order.
    pub async fn recent_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let rows = sqlx::query(
            "SELECT * FROM (SELECT * FROM messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2)
             ORDER BY id ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows
            .iter()
            .map(|row| StoredMessage {
                id: row.get("id"),
                session_id: row.get("session_id"),
                role: MessageRole::parse(row.get::<String, _>("role").as_str()),
                content: row.get("content"),
                rag_strategy: row.get("rag_strategy"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    pub async fn create_tool(&self, session_id: &str, tool: NewTool) -> Result<ToolRecord, ApiError> {
        match tool.kind {
            ToolKind::Api => {
                if tool.api_url.as_deref().unwrap_or("").is_empty() {
                    return Err(ApiError::BadRequest("api tool requires api_url".to_string()));
                }
            }
            ToolKind::PythonFunction => {
                if tool.function_code.as_deref().unwrap_or("").is_empty() {
                    return Err(ApiError::BadRequest(
                        "python_function tool requires function_code".to_string(),
                    ));
                }
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO tools
                (id, session_id, name, tool_type, api_url, http_method, function_code,
                 description, params_doc, returns_doc, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(&tool.name)
        .bind(tool.kind.as_str())
        .bind(&tool.api_url)
        .bind(tool.http_method.as_deref().unwrap_or("GET"))
        .bind(&tool.function_code)
        .bind(&tool.description)
        .bind(&tool.params_doc)
        .bind(&tool.returns_doc)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(ToolRecord {
            id,
            session_id: session_id.to_string(),
            name: tool.name,
            kind: tool.kind,
            api_url: tool.api_url,
            http_method: tool.http_method.or_else(|| Some("GET".to_string())),
            function_code: tool.function_code,
            description: tool.description,
            params_doc: tool.params_doc,
            returns_doc: tool.returns_doc,
            created_at: now,
        })
    }

    /// Tools in registration order; resolution ties break on this order.
    pub async fn list_tools(&self, session_id: &str) -> Result<Vec<ToolRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT * FROM tools WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut tools = Vec::new();
        for row in rows {
            let raw_kind: String = row.get("tool_type");
            let Some(kind) = ToolKind::parse(&raw_kind) else {
                tracing::warn!("skipping tool with unknown type: {}", raw_kind);
                continue;
            };
            tools.push(ToolRecord {
                id: row.get("id"),
                session_id: row.get("session_id"),
                name: row.get("name"),
                kind,
                api_url: row.get("api_url"),
                http_method: row.get("http_method"),
                function_code: row.get("function_code"),
                description: row.get("description"),
                params_doc: row.get("params_doc"),
                returns_doc: row.get("returns_doc"),
                created_at: row.get("created_at"),
            });
        }
        Ok(tools)
    }

    pub async fn delete_tool(&self, tool_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM tools WHERE id = ?1")
            .bind(tool_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Session {
        let model_json: String = row.get("model_config");
        let model_config = serde_json::from_str(&model_json).unwrap_or_default();

        Session {
            id: row.get("id"),
            name: row.get("name"),
            owner: row.get("owner"),
            chunk_size: row.get::<i64, _>("chunk_size") as u32,
            chunk_overlap: row.get::<i64, _>("chunk_overlap") as u32,
            internet_search_enabled: row.get::<i64, _>("internet_search_enabled") != 0,
            model_config,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub async fn test_store() -> SessionStore {
        let db_path = std::env::temp_dir().join(format!(
            "docuchat-store-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SessionStore::new(db_path).await.unwrap()
    }

    pub async fn test_session(store: &SessionStore) -> Session {
        store
            .create_session("test", "admin", 1000, 200, false, ModelConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn session_crud_roundtrip() {
        let store = test_store().await;
        let session = test_session(&store).await;

        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.chunk_size, 1000);
        assert!(!fetched.internet_search_enabled);

        let updated = store
            .update_session(
                &session.id,
                SessionUpdate {
                    internet_search_enabled: Some(true),
                    chunk_size: Some(500),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.internet_search_enabled);
        assert_eq!(updated.chunk_size, 500);

        assert!(store.delete_session(&session.id).await.unwrap());
        assert!(store.get_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_chunk_size_rejected() {
        let store = test_store().await;
        let err = store
            .create_session("bad", "admin", 0, 0, false, ModelConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn documents_accumulate_in_upload_order() {
        let store = test_store().await;
        let session = test_session(&store).await;

        store
            .add_document(&session.id, "a.pdf", &["page one".to_string()])
            .await
            .unwrap();
        store
            .add_document(
                &session.id,
                "b.pdf",
                &["page two".to_string(), "page three".to_string()],
            )
            .await
            .unwrap();

        let texts = store.accumulated_documents(&session.id).await.unwrap();
        assert_eq!(texts, vec!["page one", "page two", "page three"]);
    }

    #[tokio::test]
    async fn delete_session_cascades() {
        let store = test_store().await;
        let session = test_session(&store).await;

        store
            .add_document(&session.id, "a.pdf", &["text".to_string()])
            .await
            .unwrap();
        store
            .add_message(&session.id, MessageRole::User, "hi", None)
            .await
            .unwrap();
        store
            .create_tool(
                &session.id,
                NewTool {
                    name: "weather".to_string(),
                    kind: ToolKind::Api,
                    api_url: Some("http://example.test/weather".to_string()),
                    http_method: None,
                    function_code: None,
                    description: None,
                    params_doc: None,
                    returns_doc: None,
                },
            )
            .await
            .unwrap();

        store.delete_session(&session.id).await.unwrap();

        assert!(store.list_documents(&session.id).await.unwrap().is_empty());
        assert!(store.recent_messages(&session.id, 20).await.unwrap().is_empty());
        assert!(store.list_tools(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_messages_returns_tail_in_order() {
        let store = test_store().await;
        let session = test_session(&store).await;

        for i in 0..5 {
            store
                .add_message(&session.id, MessageRole::User, &format!("m{}", i), None)
                .await
                .unwrap();
        }

        let tail = store.recent_messages(&session.id, 3).await.unwrap();
        let contents: Vec<&str> = tail.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn tool_validation_requires_variant_fields() {
        let store = test_store().await;
        let session = test_session(&store).await;

        let err = store
            .create_tool(
                &session.id,
                NewTool {
                    name: "broken".to_string(),
                    kind: ToolKind::PythonFunction,
                    api_url: None,
                    http_method: None,
                    function_code: None,
                    description: None,
                    params_doc: None,
                    returns_doc: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
