//! Vector Index Manager — one nearest-neighbor index per session.
//!
//! Indices are rebuilt wholesale from the full accumulated document set and
//! swapped in atomically; readers see either the old or the new index, never
//! a partially-built one.

pub mod embedder;

pub use embedder::{Embedder, HttpEmbeddingClient};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    text: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub text: String,
    pub score: f32,
}

/// In-process nearest-neighbor index: brute-force cosine over stored
/// passage embeddings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn from_parts(texts: Vec<String>, embeddings: Vec<Vec<f32>>) -> Self {
        let entries = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| IndexEntry { text, embedding })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredPassage> {
        let mut scored: Vec<ScoredPassage> = self
            .entries
            .iter()
            .map(|entry| ScoredPassage {
                text: entry.text.clone(),
                score: cosine_similarity(query_embedding, &entry.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k.max(1));
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Per-session slot. The rebuild mutex serializes concurrent rebuilds; the
/// current handle is swapped wholesale once a rebuild completes.
struct SessionSlot {
    rebuild: Mutex<()>,
    current: RwLock<Option<Arc<VectorIndex>>>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            rebuild: Mutex::new(()),
            current: RwLock::new(None),
        }
    }
}

pub struct VectorIndexManager {
    index_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    slots: RwLock<HashMap<String, Arc<SessionSlot>>>,
}

impl VectorIndexManager {
    pub fn new(index_dir: PathBuf, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index_dir,
            embedder,
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn index_path(&self, session_id: &str) -> PathBuf {
        self.index_dir.join(format!("{}.json", session_id))
    }

    async fn slot(&self, session_id: &str) -> Arc<SessionSlot> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(session_id) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionSlot::new()))
            .clone()
    }

    /// Rebuilds the session's index from the complete accumulated text set,
    /// swaps it in, and overwrites the persisted copy.
    pub async fn rebuild(&self, session_id: &str, texts: Vec<String>) -> Result<usize, ApiError> {
        let slot = self.slot(session_id).await;
        let _guard = slot.rebuild.lock().await;

        let index = Arc::new(self.build(texts).await?);
        let count = index.len();

        let path = self.index_path(session_id);
        let encoded = serde_json::to_vec(index.as_ref()).map_err(ApiError::internal)?;
        tokio::fs::write(&path, encoded)
            .await
            .map_err(|e| ApiError::internal(format!("failed to persist index: {}", e)))?;

        *slot.current.write().await = Some(index);

        tracing::info!(
            "rebuilt vector index for session {} ({} passages)",
            session_id,
            count
        );
        Ok(count)
    }

    /// Builds a throwaway index that is neither cached nor persisted.
    pub async fn build(&self, texts: Vec<String>) -> Result<VectorIndex, ApiError> {
        let embeddings = self.embedder.embed(&texts).await?;
        Ok(VectorIndex::from_parts(texts, embeddings))
    }

    /// In-memory handle if present, else the persisted copy, else absent.
    /// Absence is a normal state; a corrupt persisted index also reads as
    /// absent.
    pub async fn get_index(&self, session_id: &str) -> Option<Arc<VectorIndex>> {
        let slot = self.slot(session_id).await;

        if let Some(index) = slot.current.read().await.as_ref() {
            return Some(index.clone());
        }

        let path = self.index_path(session_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(_) => return None,
        };

        let index: VectorIndex = match serde_json::from_slice(&raw) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(
                    "persisted index for session {} is unreadable, treating as absent: {}",
                    session_id,
                    e
                );
                return None;
            }
        };

        let index = Arc::new(index);
        let mut current = slot.current.write().await;
        // Another task may have loaded or rebuilt while we read from disk.
        if current.is_none() {
            *current = Some(index.clone());
            Some(index)
        } else {
            current.clone()
        }
    }

    pub async fn search(
        &self,
        session_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Option<Vec<ScoredPassage>>, ApiError> {
        let Some(index) = self.get_index(session_id).await else {
            return Ok(None);
        };
        if index.is_empty() {
            return Ok(None);
        }

        let query_embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let query_embedding = query_embeddings
            .first()
            .ok_or_else(|| ApiError::Internal("embedder returned no vector".to_string()))?;

        Ok(Some(index.search(query_embedding, k)))
    }

    /// Drops the in-memory handle and deletes the durable copy. A missing
    /// index is a no-op.
    pub async fn discard(&self, session_id: &str) {
        self.slots.write().await.remove(session_id);

        let path = self.index_path(session_id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to delete persisted index for {}: {}", session_id, e);
            }
        }
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;

    const DIM: usize = 32;

    /// Deterministic test embedder: identical texts map to identical
    /// vectors, distinct texts land on (almost always) distinct axes.
    pub struct StubEmbedder;

    impl StubEmbedder {
        fn vector(text: &str) -> Vec<f32> {
            let mut v = vec![0.0; DIM];
            let mut hash: u64 = 1469598103934665603;
            for byte in text.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            v[(hash % DIM as u64) as usize] = 1.0;
            v[(hash >> 8) as usize % DIM] += 0.5;
            v
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }
    }

    pub fn test_manager() -> (VectorIndexManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = VectorIndexManager::new(dir.path().to_path_buf(), Arc::new(StubEmbedder));
        (manager, dir)
    }

    #[tokio::test]
    async fn absent_index_is_not_an_error() {
        let (manager, _dir) = test_manager();
        assert!(manager.get_index("missing").await.is_none());
        assert!(manager.search("missing", "anything", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rebuild_is_wholesale_not_incremental() {
        let (manager, _dir) = test_manager();

        manager
            .rebuild("s1", vec!["alpha passage".to_string()])
            .await
            .unwrap();
        let first = manager.get_index("s1").await.unwrap();
        assert_eq!(first.len(), 1);

        manager
            .rebuild(
                "s1",
                vec!["alpha passage".to_string(), "bravo passage".to_string()],
            )
            .await
            .unwrap();

        let results = manager
            .search("s1", "bravo passage", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results[0].text, "bravo passage");
    }

    #[tokio::test]
    async fn persisted_index_survives_memory_drop() {
        let (manager, dir) = test_manager();

        manager
            .rebuild("s1", vec!["persistent passage".to_string()])
            .await
            .unwrap();

        // Fresh manager over the same directory simulates a restart.
        let reloaded =
            VectorIndexManager::new(dir.path().to_path_buf(), Arc::new(StubEmbedder));
        let index = reloaded.get_index("s1").await.unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_persisted_index_reads_as_absent() {
        let (manager, dir) = test_manager();

        std::fs::write(dir.path().join("s1.json"), b"not json at all").unwrap();
        assert!(manager.get_index("s1").await.is_none());
    }

    #[tokio::test]
    async fn discard_is_idempotent() {
        let (manager, _dir) = test_manager();

        manager
            .rebuild("s1", vec!["ephemeral".to_string()])
            .await
            .unwrap();
        manager.discard("s1").await;
        assert!(manager.get_index("s1").await.is_none());

        // Second discard of an absent index is a no-op.
        manager.discard("s1").await;
    }
}
