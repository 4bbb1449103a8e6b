use async_trait::async_trait;

use super::types::CompletionRequest;
use crate::core::errors::ApiError;

/// Black-box text completion service.
///
/// Used uniformly for answer composition, query paraphrase generation,
/// tool-routing decisions, and tool-output summarization.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError>;
}
