//! Retrieval Strategy Engine — four interchangeable retrieval and
//! answer-composition algorithms.

use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::index::VectorIndexManager;
use crate::llm::{CompletionRequest, LanguageModel, ModelConfig};
use crate::memory::ConversationMemoryCache;
use crate::rag::chunker;
use crate::store::SessionStore;

/// Returned verbatim by every strategy when the session has no index yet.
/// A normal response, not an error.
pub const NO_DOCUMENTS_REPLY: &str = "Please upload a document to this session first.";

/// Turns of conversation history blended into the contextual prompt.
const CONTEXTUAL_HISTORY_TURNS: usize = 6;
/// Paraphrases requested for multi-query fan-out.
const MULTI_QUERY_VARIANTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    Naive,
    Chunking,
    Contextual,
    MultiQuery,
}

impl RetrievalStrategy {
    /// Unknown names fall back to `contextual`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "naive" => RetrievalStrategy::Naive,
            "chunking" => RetrievalStrategy::Chunking,
            "contextual" => RetrievalStrategy::Contextual,
            "multi_query" => RetrievalStrategy::MultiQuery,
            _ => RetrievalStrategy::Contextual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Naive => "naive",
            RetrievalStrategy::Chunking => "chunking",
            RetrievalStrategy::Contextual => "contextual",
            RetrievalStrategy::MultiQuery => "multi_query",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyParams {
    pub k: usize,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            k: 5,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

pub struct RetrievalEngine {
    store: SessionStore,
    indices: Arc<VectorIndexManager>,
    memory: Arc<ConversationMemoryCache>,
}

impl RetrievalEngine {
    pub fn new(
        store: SessionStore,
        indices: Arc<VectorIndexManager>,
        memory: Arc<ConversationMemoryCache>,
    ) -> Self {
        Self {
            store,
            indices,
            memory,
        }
    }

    pub async fn answer(
        &self,
        llm: &dyn LanguageModel,
        model_config: &ModelConfig,
        strategy: RetrievalStrategy,
        query: &str,
        session_id: &str,
        params: StrategyParams,
    ) -> Result<String, ApiError> {
        match strategy {
            RetrievalStrategy::Naive => {
                self.naive(llm, model_config, query, session_id, params).await
            }
            RetrievalStrategy::Chunking => {
                self.chunking(llm, model_config, query, session_id, params).await
            }
            RetrievalStrategy::Contextual => {
                self.contextual(llm, model_config, query, session_id, params).await
            }
            RetrievalStrategy::MultiQuery => {
                self.multi_query(llm, model_config, query, session_id, params).await
            }
        }
    }

    /// Top-k from the existing index, one completion over the concatenated
    /// passages.
    async fn naive(
        &self,
        llm: &dyn LanguageModel,
        model_config: &ModelConfig,
        query: &str,
        session_id: &str,
        params: StrategyParams,
    ) -> Result<String, ApiError> {
        let Some(passages) = self.indices.search(session_id, query, params.k).await? else {
            return Ok(NO_DOCUMENTS_REPLY.to_string());
        };

        let context = join_passages(passages.iter().map(|p| p.text.as_str()));
        let prompt = compose_prompt(&context, query);
        llm.complete(CompletionRequest::new(prompt).with_model_config(model_config))
            .await
    }

    /// Re-splits the full accumulated document set with the requested chunk
    /// parameters, builds a throwaway index over the fresh chunks, then
    /// answers from those.
    async fn chunking(
        &self,
        llm: &dyn LanguageModel,
        model_config: &ModelConfig,
        query: &str,
        session_id: &str,
        params: StrategyParams,
    ) -> Result<String, ApiError> {
        let documents = self.store.accumulated_documents(session_id).await?;
        if documents.is_empty() {
            return Ok(NO_DOCUMENTS_REPLY.to_string());
        }

        let chunks = chunker::split_documents(
            &documents,
            params.chunk_size as usize,
            params.chunk_overlap as usize,
        );
        if chunks.is_empty() {
            return Ok(NO_DOCUMENTS_REPLY.to_string());
        }

        let index = self.indices.build(chunks).await?;
        let embedder = self.indices.embedder();
        let query_embedding = embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("embedder returned no vector".to_string()))?;

        let passages = index.search(&query_embedding, params.k);
        let context = join_passages(passages.iter().map(|p| p.text.as_str()));
        let prompt = compose_prompt(&context, query);
        llm.complete(CompletionRequest::new(prompt).with_model_config(model_config))
            .await
    }

    /// Blends retrieved passages with the recent conversation window, then
    /// appends the new exchange to memory.
    async fn contextual(
        &self,
        llm: &dyn LanguageModel,
        model_config: &ModelConfig,
        query: &str,
        session_id: &str,
        params: StrategyParams,
    ) -> Result<String, ApiError> {
        let Some(passages) = self.indices.search(session_id, query, params.k).await? else {
            return Ok(NO_DOCUMENTS_REPLY.to_string());
        };

        let turns = self
            .memory
            .recent_turns(session_id, CONTEXTUAL_HISTORY_TURNS)
            .await?;
        let history: String = turns
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.text))
            .collect::<Vec<_>>()
            .join("\n");

        let context = join_passages(passages.iter().map(|p| p.text.as_str()));
        let prompt = format!(
            "Conversation history:\n{}\n\n\
             Context from documents:\n{}\n\n\
             Current question: {}\n\n\
             Based on the conversation history and document context, provide a comprehensive answer:",
            history, context, query
        );

        let answer = llm
            .complete(CompletionRequest::new(prompt).with_model_config(model_config))
            .await?;

        self.memory
            .record_exchange(session_id, query, &answer)
            .await?;

        Ok(answer)
    }

    /// Fans the query out into LLM-generated paraphrases, retrieves per
    /// variant, deduplicates by exact text, and composes over the first k
    /// unique passages.
    async fn multi_query(
        &self,
        llm: &dyn LanguageModel,
        model_config: &ModelConfig,
        query: &str,
        session_id: &str,
        params: StrategyParams,
    ) -> Result<String, ApiError> {
        if self.indices.get_index(session_id).await.is_none() {
            return Ok(NO_DOCUMENTS_REPLY.to_string());
        }

        let paraphrase_prompt = format!(
            "Generate {} different ways to ask the following question to get \
             comprehensive information.\n\n\
             Original question: {}\n\n\
             Provide {} alternative questions (one per line, no numbering):",
            MULTI_QUERY_VARIANTS, query, MULTI_QUERY_VARIANTS
        );
        let reply = llm
            .complete(CompletionRequest::new(paraphrase_prompt).with_model_config(model_config))
            .await?;

        let mut queries = vec![query.to_string()];
        queries.extend(
            reply
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .take(MULTI_QUERY_VARIANTS)
                .map(String::from),
        );

        let per_query_k = params.k / queries.len() + 1;

        let mut unique = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for q in &queries {
            let Some(passages) = self.indices.search(session_id, q, per_query_k).await? else {
                continue;
            };
            for passage in passages {
                if seen.insert(passage.text.clone()) {
                    unique.push(passage.text);
                }
            }
        }

        unique.truncate(params.k);
        let context = join_passages(unique.iter().map(String::as_str));
        let prompt = format!(
            "Context:\n{}\n\n\
             Question: {}\n\n\
             Based on the comprehensive context gathered from multiple query \
             variations, provide a detailed answer:",
            context, query
        );
        llm.complete(CompletionRequest::new(prompt).with_model_config(model_config))
            .await
    }
}

fn join_passages<'a>(passages: impl Iterator<Item = &'a str>) -> String {
    passages.collect::<Vec<_>>().join("\n\n")
}

fn compose_prompt(context: &str, query: &str) -> String {
    format!(
        "Context:\n{}\n\n\
         Question: {}\n\n\
         Answer the question using the context above:",
        context, query
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::index::tests::StubEmbedder;
    use crate::store::tests::{test_session, test_store};
    use crate::store::Session;

    /// Scripted language model: pops canned replies in order, records every
    /// prompt it sees. An empty script means every call fails.
    pub struct StubLlm {
        replies: Mutex<VecDeque<String>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl StubLlm {
        pub fn with_replies(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self::with_replies(&[])
        }
    }

    #[async_trait]
    impl LanguageModel for StubLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(request.prompt);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ApiError::Internal("stub exhausted".to_string()))
        }
    }

    pub struct Harness {
        pub store: SessionStore,
        pub engine: RetrievalEngine,
        pub indices: Arc<VectorIndexManager>,
        pub memory: Arc<ConversationMemoryCache>,
        pub session: Session,
        _dir: tempfile::TempDir,
    }

    pub async fn harness() -> Harness {
        let store = test_store().await;
        let session = test_session(&store).await;
        let dir = tempfile::tempdir().unwrap();
        let indices = Arc::new(VectorIndexManager::new(
            dir.path().to_path_buf(),
            Arc::new(StubEmbedder),
        ));
        let memory = Arc::new(ConversationMemoryCache::new(store.clone()));
        let engine = RetrievalEngine::new(store.clone(), indices.clone(), memory.clone());
        Harness {
            store,
            engine,
            indices,
            memory,
            session,
            _dir: dir,
        }
    }

    pub async fn seed_index(h: &Harness, texts: &[&str]) {
        let owned: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
        h.store
            .add_document(&h.session.id, "seed.pdf", &owned)
            .await
            .unwrap();
        let accumulated = h.store.accumulated_documents(&h.session.id).await.unwrap();
        h.indices.rebuild(&h.session.id, accumulated).await.unwrap();
    }

    #[tokio::test]
    async fn every_strategy_returns_fallback_without_documents() {
        let h = harness().await;
        let llm = StubLlm::with_replies(&["should not be used"; 4]);

        for strategy in [
            RetrievalStrategy::Naive,
            RetrievalStrategy::Chunking,
            RetrievalStrategy::Contextual,
            RetrievalStrategy::MultiQuery,
        ] {
            let answer = h
                .engine
                .answer(
                    &llm,
                    &h.session.model_config,
                    strategy,
                    "anything",
                    &h.session.id,
                    StrategyParams::default(),
                )
                .await
                .unwrap();
            assert_eq!(answer, NO_DOCUMENTS_REPLY, "strategy {:?}", strategy);
        }

        // The fallback never touched the model.
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn naive_composes_over_retrieved_passages() {
        let h = harness().await;
        seed_index(&h, &["the sky is blue", "grass is green"]).await;

        let llm = StubLlm::with_replies(&["composed answer"]);
        let answer = h
            .engine
            .answer(
                &llm,
                &h.session.model_config,
                RetrievalStrategy::Naive,
                "the sky is blue",
                &h.session.id,
                StrategyParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(answer, "composed answer");
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("the sky is blue"));
    }

    #[tokio::test]
    async fn chunking_rebuilds_from_raw_documents() {
        let h = harness().await;
        // Documents exist but no persisted index: chunking works from raw
        // text alone.
        h.store
            .add_document(
                &h.session.id,
                "raw.pdf",
                &["A long first sentence about alpha. Another about beta.".to_string()],
            )
            .await
            .unwrap();

        let llm = StubLlm::with_replies(&["chunked answer"]);
        let answer = h
            .engine
            .answer(
                &llm,
                &h.session.model_config,
                RetrievalStrategy::Chunking,
                "alpha",
                &h.session.id,
                StrategyParams {
                    k: 3,
                    chunk_size: 30,
                    chunk_overlap: 5,
                },
            )
            .await
            .unwrap();

        assert_eq!(answer, "chunked answer");
    }

    #[tokio::test]
    async fn contextual_blends_history_and_updates_memory() {
        let h = harness().await;
        seed_index(&h, &["document passage"]).await;

        h.memory
            .record_exchange(&h.session.id, "earlier question", "earlier answer")
            .await
            .unwrap();

        let llm = StubLlm::with_replies(&["contextual answer"]);
        let answer = h
            .engine
            .answer(
                &llm,
                &h.session.model_config,
                RetrievalStrategy::Contextual,
                "follow-up question",
                &h.session.id,
                StrategyParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(answer, "contextual answer");

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("earlier question"));
        assert!(prompts[0].contains("document passage"));

        // The new exchange landed in the window.
        let turns = h.memory.recent_turns(&h.session.id, 10).await.unwrap();
        assert_eq!(turns.last().unwrap().text, "contextual answer");
    }

    #[tokio::test]
    async fn multi_query_deduplicates_passages() {
        let h = harness().await;
        seed_index(&h, &["shared passage", "unique passage"]).await;

        // First reply: paraphrases that all resolve to the same passage.
        let llm = StubLlm::with_replies(&[
            "shared passage\nshared passage\nshared passage",
            "fanned answer",
        ]);

        let answer = h
            .engine
            .answer(
                &llm,
                &h.session.model_config,
                RetrievalStrategy::MultiQuery,
                "shared passage",
                &h.session.id,
                StrategyParams::default(),
            )
            .await
            .unwrap();

        assert_eq!(answer, "fanned answer");
        let prompts = llm.prompts.lock().unwrap();
        // Composition prompt contains the passage exactly once.
        let composition = &prompts[1];
        assert_eq!(composition.matches("shared passage").count(), 2); // context + echoed question
    }

    #[test]
    fn unknown_strategy_name_falls_back_to_contextual() {
        assert_eq!(
            RetrievalStrategy::from_name("definitely-not-real"),
            RetrievalStrategy::Contextual
        );
        assert_eq!(RetrievalStrategy::from_name("naive"), RetrievalStrategy::Naive);
    }
}
