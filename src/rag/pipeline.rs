//! Query Resolution Pipeline.
//!
//! Stages run in a fixed order and each either yields an answer or declines;
//! the first answer wins. Stage order: explicit tool mention, LLM-routed
//! tool, internet search (blended with the retrieval strategy), retrieval
//! strategy alone. Every stage swallows its own failures, so the pipeline
//! always returns some text.

use std::sync::Arc;

use crate::core::errors::ApiError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::rag::strategy::{RetrievalEngine, RetrievalStrategy, StrategyParams};
use crate::search::{self, SearchProvider};
use crate::store::{Session, SessionStore, ToolRecord};
use crate::tools::{self, executor::ToolExecutor};

/// Returned only when every stage, including the final strategy fallback,
/// failed to produce text.
const DEGRADED_REPLY: &str =
    "I wasn't able to produce an answer right now. Please try again.";

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub strategy: RetrievalStrategy,
    pub params: StrategyParams,
    /// Forces the search gate open and prioritizes internet results in the
    /// composition.
    pub internet_first: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::Contextual,
            params: StrategyParams::default(),
            internet_first: false,
        }
    }
}

pub struct QueryPipeline {
    store: SessionStore,
    engine: RetrievalEngine,
    search: Arc<dyn SearchProvider>,
    executor: ToolExecutor,
    llm: Arc<dyn LanguageModel>,
    max_search_results: usize,
}

impl QueryPipeline {
    pub fn new(
        store: SessionStore,
        engine: RetrievalEngine,
        search: Arc<dyn SearchProvider>,
        executor: ToolExecutor,
        llm: Arc<dyn LanguageModel>,
        max_search_results: usize,
    ) -> Self {
        Self {
            store,
            engine,
            search,
            executor,
            llm,
            max_search_results,
        }
    }

    /// Resolves one query against one session. Infallible by contract: the
    /// caller always receives an answer string.
    pub async fn resolve(&self, session: &Session, query: &str, options: &ResolveOptions) -> String {
        let tools = match self.store.list_tools(&session.id).await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!("tool catalog unavailable for {}: {}", session.id, e);
                Vec::new()
            }
        };

        if let Some(answer) = self.explicit_tool_stage(session, query, &tools).await {
            return answer;
        }

        if let Some(answer) = self.routed_tool_stage(session, query, &tools).await {
            return answer;
        }

        if let Some(answer) = self.internet_stage(session, query, options).await {
            return answer;
        }

        self.strategy_stage(session, query, options).await
    }

    async fn explicit_tool_stage(
        &self,
        session: &Session,
        query: &str,
        tools: &[ToolRecord],
    ) -> Option<String> {
        let invocation = tools::resolve_explicit(query, tools)?;
        tracing::info!(
            "explicit mention selected tool '{}' for session {}",
            invocation.tool.name,
            session.id
        );
        Some(self.run_tool(session, query, &invocation).await)
    }

    async fn routed_tool_stage(
        &self,
        session: &Session,
        query: &str,
        tools: &[ToolRecord],
    ) -> Option<String> {
        let invocation = tools::resolve_routed(
            self.llm.as_ref(),
            &session.model_config,
            query,
            tools,
        )
        .await?;
        tracing::info!(
            "router selected tool '{}' for session {}",
            invocation.tool.name,
            session.id
        );
        Some(self.run_tool(session, query, &invocation).await)
    }

    async fn run_tool(
        &self,
        session: &Session,
        query: &str,
        invocation: &tools::ToolInvocation,
    ) -> String {
        let output = self
            .executor
            .execute(&invocation.tool, invocation.payload.as_ref())
            .await;

        tools::executor::summarize_output(
            self.llm.as_ref(),
            &session.model_config,
            &invocation.tool.name,
            query,
            &output,
        )
        .await
    }

    async fn internet_stage(
        &self,
        session: &Session,
        query: &str,
        options: &ResolveOptions,
    ) -> Option<String> {
        if !session.internet_search_enabled {
            return None;
        }
        if !options.internet_first && !search::should_search(query) {
            return None;
        }

        let results = self.search.search(query, self.max_search_results).await;
        if results.is_empty() {
            tracing::info!("internet search yielded nothing, falling through");
            return None;
        }

        let search_block = search::format_for_model(&results);
        let strategy_answer = self.try_strategy(session, query, options).await;

        let answer = if options.internet_first {
            self.compose_internet_first(session, query, &search_block, strategy_answer.as_deref())
                .await
        } else {
            self.compose_blended(session, query, &search_block, strategy_answer.as_deref())
                .await
        };

        match answer {
            Ok(text) => Some(text),
            Err(e) => {
                // Composition failed: the internet results themselves are
                // still the best available answer.
                tracing::warn!("composition failed, returning raw search results: {}", e);
                Some(search_block)
            }
        }
    }

    async fn try_strategy(
        &self,
        session: &Session,
        query: &str,
        options: &ResolveOptions,
    ) -> Option<String> {
        match self
            .engine
            .answer(
                self.llm.as_ref(),
                &session.model_config,
                options.strategy,
                query,
                &session.id,
                options.params,
            )
            .await
        {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::warn!("retrieval strategy failed during blend: {}", e);
                None
            }
        }
    }

    async fn compose_blended(
        &self,
        session: &Session,
        query: &str,
        search_block: &str,
        strategy_answer: Option<&str>,
    ) -> Result<String, ApiError> {
        let prompt = format!(
            "Answer the user's question using both sources below.\n\n\
             Internet search results:\n{}\n\n\
             Answer drawn from the session's documents:\n{}\n\n\
             Question: {}\n\n\
             Combine the current information from the internet with the \
             document-grounded answer into a single response:",
            search_block,
            strategy_answer.unwrap_or("(no document-grounded answer available)"),
            query
        );

        self.llm
            .complete(CompletionRequest::new(prompt).with_model_config(&session.model_config))
            .await
    }

    async fn compose_internet_first(
        &self,
        session: &Session,
        query: &str,
        search_block: &str,
        strategy_answer: Option<&str>,
    ) -> Result<String, ApiError> {
        let prompt = format!(
            "Answer the user's question primarily from the internet search \
             results below; they are the freshest source available.\n\n\
             Internet search results:\n{}\n\n\
             Secondary document context (use only to supplement):\n{}\n\n\
             Question: {}\n\n\
             Answer:",
            search_block,
            strategy_answer.unwrap_or("(none)"),
            query
        );

        self.llm
            .complete(CompletionRequest::new(prompt).with_model_config(&session.model_config))
            .await
    }

    async fn strategy_stage(
        &self,
        session: &Session,
        query: &str,
        options: &ResolveOptions,
    ) -> String {
        match self
            .engine
            .answer(
                self.llm.as_ref(),
                &session.model_config,
                options.strategy,
                query,
                &session.id,
                options.params,
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("all pipeline stages failed for {}: {}", session.id, e);
                DEGRADED_REPLY.to_string()
            }
        }
    }
}
