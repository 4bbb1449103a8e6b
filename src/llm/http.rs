//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LanguageModel;
use super::types::CompletionRequest;
use crate::core::config::LlmConfig;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct HttpLlmClient {
    base_url: String,
    default_model: String,
    default_temperature: f64,
    default_max_tokens: Option<u32>,
    api_key: Option<String>,
    client: Client,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for HttpLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.unwrap_or_else(|| self.default_model.clone());

        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": request.prompt}],
            "stream": false,
            "temperature": request.temperature.unwrap_or(self.default_temperature),
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.max_tokens.or(self.default_max_tokens) {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = request.api_key.as_deref().or(self.api_key.as_deref()) {
            builder = builder.bearer_auth(key);
        }

        let res = builder.send().await.map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "completion request failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if content.is_empty() {
            return Err(ApiError::Internal(
                "completion response had no content".to_string(),
            ));
        }

        Ok(content)
    }
}
