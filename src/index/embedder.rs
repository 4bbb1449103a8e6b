use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::EmbeddingConfig;
use crate::core::errors::ApiError;

/// Black-box embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// OpenAI-compatible `/embeddings` client.
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let res = builder.send().await.map_err(ApiError::internal)?;
        if !res.status().is_success() {
            return Err(ApiError::Internal(format!(
                "embedding request failed: {}",
                res.status()
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let data = payload
            .get("data")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ApiError::Internal("embedding response missing data".to_string()))?;

        let mut vectors = Vec::with_capacity(data.len());
        for entry in data {
            let embedding = entry
                .get("embedding")
                .and_then(|v| v.as_array())
                .ok_or_else(|| {
                    ApiError::Internal("embedding entry missing vector".to_string())
                })?;
            vectors.push(
                embedding
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .map(|v| v as f32)
                    .collect(),
            );
        }

        if vectors.len() != texts.len() {
            return Err(ApiError::Internal(format!(
                "embedding count mismatch: {} inputs, {} vectors",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}
