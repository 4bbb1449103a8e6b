//! Conversation Memory Cache — bounded rolling window of recent exchanges
//! per session.
//!
//! Windows are seeded once per process lifetime from persisted history and
//! then updated in-memory only. A restart reseeds from storage, which may
//! differ from the window at crash time; that staleness is accepted.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

use crate::core::errors::ApiError;
use crate::store::{MessageRole, SessionStore};

/// Number of retained exchanges (user/assistant pairs).
const WINDOW_EXCHANGES: usize = 10;
/// Messages read from storage when seeding a fresh window.
const SEED_MESSAGES: i64 = 20;

#[derive(Debug, Clone)]
pub struct MemoryTurn {
    pub role: MessageRole,
    pub text: String,
}

#[derive(Debug, Default)]
struct MemoryWindow {
    turns: VecDeque<MemoryTurn>,
}

impl MemoryWindow {
    fn push_exchange(&mut self, user_text: &str, assistant_text: &str) {
        self.turns.push_back(MemoryTurn {
            role: MessageRole::User,
            text: user_text.to_string(),
        });
        self.turns.push_back(MemoryTurn {
            role: MessageRole::Assistant,
            text: assistant_text.to_string(),
        });

        // FIFO: evict whole oldest pairs, never single turns.
        while self.turns.len() > WINDOW_EXCHANGES * 2 {
            self.turns.pop_front();
            self.turns.pop_front();
        }
    }
}

pub struct ConversationMemoryCache {
    store: SessionStore,
    windows: Mutex<HashMap<String, MemoryWindow>>,
}

impl ConversationMemoryCache {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Last `n` turns of the session's window, oldest first. Seeds the
    /// window from persisted history on first access.
    pub async fn recent_turns(
        &self,
        session_id: &str,
        n: usize,
    ) -> Result<Vec<MemoryTurn>, ApiError> {
        let mut windows = self.windows.lock().await;
        let window = self.ensure_seeded(&mut windows, session_id).await?;

        let skip = window.turns.len().saturating_sub(n);
        Ok(window.turns.iter().skip(skip).cloned().collect())
    }

    /// Appends a completed exchange, evicting the oldest pair once the
    /// window exceeds its bound.
    pub async fn record_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), ApiError> {
        let mut windows = self.windows.lock().await;
        let window = self.ensure_seeded(&mut windows, session_id).await?;
        window.push_exchange(user_text, assistant_text);
        Ok(())
    }

    /// Drops the session's window; used on session deletion.
    pub async fn forget(&self, session_id: &str) {
        self.windows.lock().await.remove(session_id);
    }

    async fn ensure_seeded<'a>(
        &self,
        windows: &'a mut HashMap<String, MemoryWindow>,
        session_id: &str,
    ) -> Result<&'a mut MemoryWindow, ApiError> {
        match windows.entry(session_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut window = MemoryWindow::default();
                let seeded = self.store.recent_messages(session_id, SEED_MESSAGES).await?;
                for message in seeded {
                    window.turns.push_back(MemoryTurn {
                        role: message.role,
                        text: message.content,
                    });
                }
                Ok(entry.insert(window))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{test_session, test_store};

    #[tokio::test]
    async fn eleven_exchanges_retain_ten_fifo() {
        let store = test_store().await;
        let session = test_session(&store).await;
        let cache = ConversationMemoryCache::new(store);

        for i in 0..11 {
            cache
                .record_exchange(&session.id, &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }

        let turns = cache.recent_turns(&session.id, 100).await.unwrap();
        assert_eq!(turns.len(), 20);
        // Oldest exchange (q0/a0) was evicted first.
        assert_eq!(turns[0].text, "q1");
        assert_eq!(turns.last().unwrap().text, "a10");
    }

    #[tokio::test]
    async fn first_access_seeds_from_persisted_history() {
        let store = test_store().await;
        let session = test_session(&store).await;

        store
            .add_message(&session.id, MessageRole::User, "hello", None)
            .await
            .unwrap();
        store
            .add_message(&session.id, MessageRole::Assistant, "hi there", None)
            .await
            .unwrap();

        let cache = ConversationMemoryCache::new(store);
        let turns = cache.recent_turns(&session.id, 10).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, MessageRole::User);
        assert_eq!(turns[1].text, "hi there");
    }

    #[tokio::test]
    async fn window_is_not_reread_after_seeding() {
        let store = test_store().await;
        let session = test_session(&store).await;
        let cache = ConversationMemoryCache::new(store.clone());

        // Seed (empty history), then write to storage behind the cache's back.
        cache.recent_turns(&session.id, 10).await.unwrap();
        store
            .add_message(&session.id, MessageRole::User, "late arrival", None)
            .await
            .unwrap();

        // The window stays stale until the process restarts.
        let turns = cache.recent_turns(&session.id, 10).await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn forget_drops_window_and_reseed_follows_storage() {
        let store = test_store().await;
        let session = test_session(&store).await;
        let cache = ConversationMemoryCache::new(store.clone());

        cache
            .record_exchange(&session.id, "in-memory only", "noted")
            .await
            .unwrap();
        cache.forget(&session.id).await;

        store
            .add_message(&session.id, MessageRole::User, "from storage", None)
            .await
            .unwrap();

        let turns = cache.recent_turns(&session.id, 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "from storage");
    }
}
