use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub index_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let user_data_dir = discover_user_data_dir();
        let log_dir = user_data_dir.join("logs");
        let db_path = user_data_dir.join("docuchat.db");
        let index_dir = user_data_dir.join("indices");
        let config_path = user_data_dir.join("config.toml");

        for dir in [&user_data_dir, &log_dir, &index_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            user_data_dir,
            log_dir,
            db_path,
            index_dir,
            config_path,
        }
    }

    #[cfg(test)]
    pub fn for_tests(root: &std::path::Path) -> Self {
        let user_data_dir = root.to_path_buf();
        let log_dir = user_data_dir.join("logs");
        let db_path = user_data_dir.join("docuchat.db");
        let index_dir = user_data_dir.join("indices");
        let config_path = user_data_dir.join("config.toml");
        for dir in [&user_data_dir, &log_dir, &index_dir] {
            let _ = fs::create_dir_all(dir);
        }
        AppPaths {
            user_data_dir,
            log_dir,
            db_path,
            index_dir,
            config_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_user_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOCUCHAT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data");
    }

    home_dir().join(".docuchat")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Application configuration loaded from `config.toml` with env overrides
/// for endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8088/v1".to_string(),
            model: "default".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090/v1".to_string(),
            model: "default-embed".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            timeout_secs: 15,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the config file if present, otherwise defaults.
    /// Env vars override endpoint and credential fields.
    pub fn load(paths: &AppPaths) -> Result<Self, ApiError> {
        let mut config = if paths.config_path.exists() {
            let raw = fs::read_to_string(&paths.config_path).map_err(ApiError::internal)?;
            toml::from_str(&raw)
                .map_err(|e| ApiError::internal(format!("invalid config.toml: {}", e)))?
        } else {
            AppConfig::default()
        };

        if let Ok(url) = env::var("DOCUCHAT_LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = env::var("DOCUCHAT_LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(key) = env::var("DOCUCHAT_LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(url) = env::var("DOCUCHAT_EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(key) = env::var("DOCUCHAT_EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(key);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.search.timeout_secs, 15);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn load_reads_toml_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::for_tests(tmp.path());
        std::fs::write(
            &paths.config_path,
            "[llm]\nbase_url = \"http://example.test/v1\"\nmodel = \"m1\"\ntemperature = 0.5\ntimeout_secs = 20\n",
        )
        .unwrap();

        let config = AppConfig::load(&paths).unwrap();
        assert_eq!(config.llm.base_url, "http://example.test/v1");
        assert_eq!(config.llm.model, "m1");
        // Untouched sections keep defaults
        assert_eq!(config.search.max_results, 5);
    }
}
