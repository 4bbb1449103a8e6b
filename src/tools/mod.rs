//! Tool Registry — resolves a query to at most one tool invocation.
//!
//! Two resolution modes run in order, first match wins: a deterministic
//! explicit-mention scan, then an LLM-routed decision over the serialized
//! catalog. Both decline silently; neither ever fails a request.

pub mod executor;

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::llm::{CompletionRequest, LanguageModel, ModelConfig};
use crate::store::ToolRecord;

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: ToolRecord,
    pub payload: Option<Value>,
}

/// Explicit-mention mode: `run <tool name>` or the bare tool name anywhere
/// in the lowercased query. First catalog match in listing order wins.
pub fn resolve_explicit(query: &str, tools: &[ToolRecord]) -> Option<ToolInvocation> {
    let query_lower = query.to_lowercase();

    for tool in tools {
        let name_lower = tool.name.to_lowercase();
        if name_lower.is_empty() {
            continue;
        }

        if query_lower.contains(&format!("run {}", name_lower))
            || query_lower.contains(&name_lower)
        {
            return Some(ToolInvocation {
                tool: tool.clone(),
                payload: extract_payload(query),
            });
        }
    }

    None
}

fn payload_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?si)\bwith\b\s*(\{.*\}|\[.*\])\s*$").expect("static pattern")
    })
}

/// Trailing JSON object/array after the word "with". Malformed JSON is
/// silently "no payload".
pub fn extract_payload(query: &str) -> Option<Value> {
    let caps = payload_pattern().captures(query)?;
    serde_json::from_str(caps.get(1)?.as_str()).ok()
}

#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub tool_name: String,
    pub arguments: Option<Value>,
}

fn json_object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static pattern"))
}

/// Best-effort decode of the router's free-form reply. Accepts only a JSON
/// object with a truthy `use_tool` and a `tool_name`; anything else is None.
pub fn decode_decision(raw: &str) -> Option<RoutingDecision> {
    let candidate = json_object_pattern().find(raw)?.as_str();
    let value: Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;

    let use_tool = match obj.get("use_tool") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) != 0.0,
        _ => false,
    };
    if !use_tool {
        return None;
    }

    let tool_name = obj.get("tool_name")?.as_str()?.trim().to_string();
    if tool_name.is_empty() {
        return None;
    }

    Some(RoutingDecision {
        tool_name,
        arguments: obj.get("arguments").cloned(),
    })
}

/// Serializes the catalog for the routing prompt.
fn catalog_block(tools: &[ToolRecord]) -> String {
    let mut lines = Vec::with_capacity(tools.len());
    for tool in tools {
        let connection = match tool.kind {
            crate::store::ToolKind::Api => format!(
                "{} {}",
                tool.http_method.as_deref().unwrap_or("GET"),
                tool.api_url.as_deref().unwrap_or("")
            ),
            crate::store::ToolKind::PythonFunction => "inline function".to_string(),
        };
        lines.push(format!(
            "- name: {}\n  type: {}\n  connection: {}\n  description: {}\n  params: {}",
            tool.name,
            tool.kind.as_str(),
            connection,
            tool.description.as_deref().unwrap_or("(none)"),
            tool.params_doc.as_deref().unwrap_or("(none)"),
        ));
    }
    lines.join("\n")
}

fn routing_prompt(query: &str, tools: &[ToolRecord]) -> String {
    format!(
        "You decide whether a registered tool should answer a user query.\n\
         Available tools:\n{}\n\n\
         User query: {}\n\n\
         Reply with a single JSON object and nothing else:\n\
         {{\"use_tool\": true|false, \"tool_name\": \"<name or empty>\", \"arguments\": {{}}}}",
        catalog_block(tools),
        query
    )
}

/// LLM-routed mode: only reached when the explicit scan found nothing.
/// Any completion failure, parse failure, or unmatched name is "no tool".
pub async fn resolve_routed(
    llm: &dyn LanguageModel,
    model_config: &ModelConfig,
    query: &str,
    tools: &[ToolRecord],
) -> Option<ToolInvocation> {
    if tools.is_empty() {
        return None;
    }

    let request =
        CompletionRequest::new(routing_prompt(query, tools)).with_model_config(model_config);
    let reply = match llm.complete(request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("tool routing completion failed: {}", e);
            return None;
        }
    };

    let decision = decode_decision(&reply)?;
    let tool = tools
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(&decision.tool_name))?;

    Some(ToolInvocation {
        tool: tool.clone(),
        payload: decision.arguments.filter(|v| !v.is_null()),
    })
}
