//! RAG orchestration layer.
//!
//! This module provides:
//! - `chunker`: overlapping text windows for the re-chunking strategy
//! - `RetrievalEngine`: the four retrieval/composition strategies
//! - `QueryPipeline`: the staged query resolution flow

pub mod chunker;
pub mod pipeline;
pub mod strategy;

pub use pipeline::{QueryPipeline, ResolveOptions};
pub use strategy::{RetrievalEngine, RetrievalStrategy, StrategyParams, NO_DOCUMENTS_REPLY};
