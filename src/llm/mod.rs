pub mod http;
pub mod provider;
pub mod types;

pub use http::HttpLlmClient;
pub use provider::LanguageModel;
pub use types::{CompletionRequest, ModelConfig};
