//! Internet Search Gate — heuristic classifier plus DuckDuckGo provider.
//!
//! Absence of results is always a valid, silent outcome: network and parse
//! failures at any stage yield an empty list, never an error.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::SearchConfig;
use crate::core::errors::ApiError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const INSTANT_ANSWER_URL: &str = "https://api.duckduckgo.com/";
const WEB_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const INSTANT_ANSWER_CAP: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct WebSearchResult {
    pub title: String,
    pub content: String,
    pub url: String,
    pub source: String,
}

/// Temporal/current-events terms that suggest the answer lives outside the
/// uploaded documents.
const SEARCH_KEYWORDS: [&str; 28] = [
    "current",
    "latest",
    "recent",
    "today",
    "now",
    "2024",
    "2025",
    "news",
    "update",
    "happening",
    "trending",
    "price",
    "weather",
    "stock",
    "market",
    "crypto",
    "bitcoin",
    "ethereum",
    "covid",
    "pandemic",
    "election",
    "war",
    "crisis",
    "breaking",
    "live",
    "real-time",
    "what is happening",
    "what's new",
];

fn current_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"what.*happening.*now",
            r"what.*latest.*on",
            r"current.*status.*of",
            r"recent.*developments.*in",
            r"what.*new.*in",
            r"latest.*news.*about",
            r"current.*price.*of",
            r"what.*weather.*today",
            r"breaking.*news",
            r"live.*updates",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Pure heuristic: does this query warrant a live web lookup?
pub fn should_search(query: &str) -> bool {
    let query_lower = query.to_lowercase();

    if SEARCH_KEYWORDS
        .iter()
        .any(|keyword| query_lower.contains(keyword))
    {
        return true;
    }

    current_patterns()
        .iter()
        .any(|pattern| pattern.is_match(&query_lower))
}

/// Renders results as a numbered plain-text block for model consumption.
pub fn format_for_model(results: &[WebSearchResult]) -> String {
    if results.is_empty() {
        return "No search results found.".to_string();
    }

    let mut blocks = Vec::with_capacity(results.len());
    for (i, result) in results.iter().enumerate() {
        let mut block = format!("{}. {}\n", i + 1, result.title);
        block.push_str(&format!("   Content: {}\n", result.content));
        if !result.url.is_empty() {
            block.push_str(&format!("   URL: {}\n", result.url));
        }
        block.push_str(&format!("   Source: {}\n", result.source));
        blocks.push(block);
    }
    blocks.join("\n")
}

/// External search provider seam. Implementations must swallow their own
/// failures: no results is the only failure mode callers see.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Vec<WebSearchResult>;
}

#[derive(Clone)]
pub struct SearchClient {
    client: Client,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self { client })
    }

    pub async fn instant_answer(&self, query: &str, max_results: usize) -> Vec<WebSearchResult> {
        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            INSTANT_ANSWER_URL,
            urlencoding::encode(query)
        );
        let response = self.client.get(&url).send().await;

        let payload: Value = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("instant answer parse failed: {}", e);
                    return Vec::new();
                }
            },
            Ok(resp) => {
                tracing::warn!("instant answer request failed: {}", resp.status());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("instant answer request failed: {}", e);
                return Vec::new();
            }
        };

        let mut results = Vec::new();

        if let Some(abstract_text) = payload.get("Abstract").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() {
                results.push(WebSearchResult {
                    title: payload
                        .get("Heading")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Instant Answer")
                        .to_string(),
                    content: abstract_text.to_string(),
                    url: payload
                        .get("AbstractURL")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    source: "DuckDuckGo Instant Answer".to_string(),
                });
            }
        }

        if let Some(topics) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
            for topic in topics {
                if results.len() >= max_results {
                    break;
                }
                let text = topic.get("Text").and_then(|v| v.as_str()).unwrap_or("");
                let url = topic.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
                if text.is_empty() {
                    continue;
                }
                results.push(WebSearchResult {
                    title: text.split(" - ").next().unwrap_or(text).to_string(),
                    content: text.to_string(),
                    url: url.to_string(),
                    source: "DuckDuckGo Related Topics".to_string(),
                });
            }
        }

        results.truncate(max_results);
        results
    }

    pub async fn web_search(&self, query: &str, max_results: usize) -> Vec<WebSearchResult> {
        let url = format!(
            "{}?q={}&kl=us-en",
            WEB_SEARCH_URL,
            urlencoding::encode(query)
        );
        let response = self.client.get(&url).send().await;

        let html = match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("web search body read failed: {}", e);
                    return Vec::new();
                }
            },
            Ok(resp) => {
                tracing::warn!("web search request failed: {}", resp.status());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("web search request failed: {}", e);
                return Vec::new();
            }
        };

        parse_web_results(&html, max_results)
    }
}

#[async_trait]
impl SearchProvider for SearchClient {
    /// Combined search: instant answers first (capped), web results fill the
    /// remainder.
    async fn search(&self, query: &str, max_results: usize) -> Vec<WebSearchResult> {
        let mut results = self.instant_answer(query, INSTANT_ANSWER_CAP).await;

        let remaining = max_results.saturating_sub(results.len());
        if remaining > 0 {
            results.extend(self.web_search(query, remaining).await);
        }

        results.truncate(max_results);
        results
    }
}

fn result_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#)
            .expect("static pattern")
    })
}

fn result_snippet_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#)
            .expect("static pattern")
    })
}

fn parse_web_results(html: &str, max_results: usize) -> Vec<WebSearchResult> {
    let links: Vec<(String, String)> = result_link_pattern()
        .captures_iter(html)
        .map(|caps| (caps[1].to_string(), strip_tags(&caps[2])))
        .collect();

    let snippets: Vec<String> = result_snippet_pattern()
        .captures_iter(html)
        .map(|caps| strip_tags(&caps[1]))
        .collect();

    let mut results = Vec::new();
    for (i, (url, title)) in links.into_iter().enumerate() {
        if results.len() >= max_results {
            break;
        }
        if title.is_empty() || url.is_empty() {
            continue;
        }
        results.push(WebSearchResult {
            title,
            content: snippets.get(i).cloned().unwrap_or_default(),
            url,
            source: "DuckDuckGo Web Search".to_string(),
        });
    }
    results
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_accepts_temporal_queries() {
        assert!(should_search("what's the weather today"));
        assert!(should_search("latest news on AI regulation"));
        assert!(should_search("breaking   news about markets"));
    }

    #[test]
    fn heuristic_rejects_static_knowledge_queries() {
        assert!(!should_search("what is photosynthesis"));
        assert!(!should_search("summarize chapter three"));
    }

    #[test]
    fn formatting_is_numbered_and_ordered() {
        let results = vec![
            WebSearchResult {
                title: "First".to_string(),
                content: "first content".to_string(),
                url: "https://one.example".to_string(),
                source: "DuckDuckGo Web Search".to_string(),
            },
            WebSearchResult {
                title: "Second".to_string(),
                content: "second content".to_string(),
                url: String::new(),
                source: "DuckDuckGo Instant Answer".to_string(),
            },
        ];

        let block = format_for_model(&results);
        assert!(block.starts_with("1. First"));
        assert!(block.contains("2. Second"));
        assert!(block.contains("URL: https://one.example"));
        // Empty URLs are omitted entirely.
        assert_eq!(block.matches("URL:").count(), 1);
    }

    #[test]
    fn empty_results_render_fixed_sentence() {
        assert_eq!(format_for_model(&[]), "No search results found.");
    }

    #[test]
    fn web_result_parsing_pairs_titles_and_snippets() {
        let html = r#"
            <div class="result">
              <a rel="nofollow" class="result__a" href="https://a.example/page">Title <b>One</b></a>
              <a class="result__snippet" href="https://a.example/page">Snippet one text</a>
            </div>
            <div class="result">
              <a rel="nofollow" class="result__a" href="https://b.example/page">Title Two</a>
              <a class="result__snippet" href="https://b.example/page">Snippet two text</a>
            </div>
        "#;

        let results = parse_web_results(html, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Title One");
        assert_eq!(results[0].content, "Snippet one text");
        assert_eq!(results[1].url, "https://b.example/page");

        let capped = parse_web_results(html, 1);
        assert_eq!(capped.len(), 1);
    }
}
