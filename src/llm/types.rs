use serde::{Deserialize, Serialize};

/// Per-session model configuration, stored with the session and applied to
/// every completion issued on its behalf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Overrides the server-wide credential when set.
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai-compatible".to_string(),
            model: "default".to_string(),
            temperature: 0.1,
            max_tokens: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub api_key: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            temperature: None,
            max_tokens: None,
            api_key: None,
        }
    }

    pub fn with_model_config(mut self, config: &ModelConfig) -> Self {
        self.model = Some(config.model.clone());
        self.temperature = Some(config.temperature);
        self.max_tokens = config.max_tokens;
        self.api_key = config.api_key.clone();
        self
    }
}
