//! Tool execution.
//!
//! API tools become bounded HTTP requests; function tools run their stored
//! source in a separate interpreter subprocess rather than in-process. Tool
//! failures surface as error strings, never as pipeline failures; every
//! output passes through one summarization completion, with the raw output
//! as fallback.

use std::process::Stdio;
use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::core::errors::ApiError;
use crate::llm::{CompletionRequest, LanguageModel, ModelConfig};
use crate::store::{ToolKind, ToolRecord};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(15);
const OUTPUT_PREVIEW_CHARS: usize = 2000;

/// Interpreter-side harness. Reads `{"source": ..., "payload": ...}` from
/// stdin, executes the source in a fresh namespace, calls the first callable
/// it defined with payload keys filtered to the callable's parameters, and
/// retries once with no arguments on a parameter mismatch.
const PYTHON_HARNESS: &str = r#"
import inspect, json, sys

def main():
    data = json.loads(sys.stdin.read())
    namespace = {}
    exec(data["source"], namespace)

    fn = None
    for key, value in namespace.items():
        if key.startswith("__"):
            continue
        if callable(value):
            fn = value
            break
    if fn is None:
        print(json.dumps({"ok": False, "error": "no callable defined"}))
        return

    payload = data.get("payload")
    kwargs = {}
    if isinstance(payload, dict):
        try:
            params = inspect.signature(fn).parameters
            kwargs = {k: v for k, v in payload.items() if k in params}
        except (TypeError, ValueError):
            kwargs = {}

    try:
        try:
            result = fn(**kwargs)
        except TypeError:
            result = fn()
    except Exception as exc:
        print(json.dumps({"ok": False, "error": str(exc)}))
        return

    try:
        rendered = json.dumps(result)
    except (TypeError, ValueError):
        rendered = str(result)
    print(json.dumps({"ok": True, "result": rendered}))

main()
"#;

#[derive(Clone)]
pub struct ToolExecutor {
    client: Client,
}

impl ToolExecutor {
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self { client })
    }

    /// Runs the tool and returns its output or a tool-level error string.
    /// Never returns Err: a failed tool is a describable outcome, not a
    /// failed request.
    pub async fn execute(&self, tool: &ToolRecord, payload: Option<&Value>) -> String {
        let outcome = match tool.kind {
            ToolKind::Api => self.execute_api(tool, payload).await,
            ToolKind::PythonFunction => self.execute_function(tool, payload).await,
        };

        match outcome {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("tool '{}' failed: {}", tool.name, e);
                format!("Tool '{}' failed: {}", tool.name, e)
            }
        }
    }

    async fn execute_api(
        &self,
        tool: &ToolRecord,
        payload: Option<&Value>,
    ) -> Result<String, ApiError> {
        let url = tool
            .api_url
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("api tool has no url".to_string()))?;
        let method = tool
            .http_method
            .as_deref()
            .unwrap_or("GET")
            .parse::<Method>()
            .unwrap_or(Method::GET);

        match self.send_api_request(&self.client, &method, url, payload).await {
            Ok(body) => Ok(truncate_chars(&body, OUTPUT_PREVIEW_CHARS)),
            Err(first_err) => {
                // One retry on a single-use client: a broken pooled
                // connection or dead keep-alive should not kill the call.
                tracing::warn!(
                    "tool '{}' transport failed, retrying on fresh client: {}",
                    tool.name,
                    first_err
                );
                let fallback = Client::builder()
                    .timeout(HTTP_TIMEOUT)
                    .build()
                    .map_err(ApiError::internal)?;
                let body = self
                    .send_api_request(&fallback, &method, url, payload)
                    .await?;
                Ok(truncate_chars(&body, OUTPUT_PREVIEW_CHARS))
            }
        }
    }

    async fn send_api_request(
        &self,
        client: &Client,
        method: &Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<String, ApiError> {
        let mut request = client.request(method.clone(), url);

        if *method == Method::GET {
            if let Some(Value::Object(map)) = payload {
                let params: Vec<(String, String)> = map
                    .iter()
                    .map(|(k, v)| {
                        let rendered = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), rendered)
                    })
                    .collect();
                request = request.query(&params);
            }
        } else {
            request = request.json(payload.unwrap_or(&Value::Object(Default::default())));
        }

        let response = request.send().await.map_err(ApiError::internal)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::internal)?;

        if !status.is_success() {
            return Err(ApiError::Internal(format!(
                "endpoint returned {}: {}",
                status,
                truncate_chars(&body, 200)
            )));
        }

        Ok(body)
    }

    async fn execute_function(
        &self,
        tool: &ToolRecord,
        payload: Option<&Value>,
    ) -> Result<String, ApiError> {
        let source = tool
            .function_code
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("function tool has no source".to_string()))?;

        let input = serde_json::to_vec(&json!({
            "source": source,
            "payload": payload,
        }))
        .map_err(ApiError::internal)?;

        let mut child = Command::new("python3")
            .arg("-c")
            .arg(PYTHON_HARNESS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ApiError::internal(format!("failed to spawn interpreter: {}", e)))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| ApiError::Internal("interpreter stdin unavailable".to_string()))?;
            stdin.write_all(&input).await.map_err(ApiError::internal)?;
        }

        let output = tokio::time::timeout(SUBPROCESS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| ApiError::Internal("function tool timed out".to_string()))?
            .map_err(ApiError::internal)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply: Value = serde_json::from_str(stdout.trim()).map_err(|_| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            ApiError::Internal(format!(
                "interpreter produced no result: {}",
                truncate_chars(stderr.trim(), 200)
            ))
        })?;

        if reply["ok"].as_bool().unwrap_or(false) {
            Ok(reply["result"].as_str().unwrap_or_default().to_string())
        } else {
            Err(ApiError::Internal(
                reply["error"].as_str().unwrap_or("unknown error").to_string(),
            ))
        }
    }
}

/// One more completion turns raw tool output into a user-facing reply.
/// If the summarization itself fails, the raw output is the answer.
pub async fn summarize_output(
    llm: &dyn LanguageModel,
    model_config: &ModelConfig,
    tool_name: &str,
    query: &str,
    output: &str,
) -> String {
    let prompt = format!(
        "The tool '{}' was executed for this user query:\n{}\n\n\
         Tool output:\n{}\n\n\
         Write a concise, user-facing answer based on the tool output. If the \
         output describes a failure, give a brief explanation and suggest next \
         steps instead of technical detail.",
        tool_name, query, output
    );

    let request = CompletionRequest::new(prompt).with_model_config(model_config);
    match llm.complete(request).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!("tool output summarization failed: {}", e);
            output.to_string()
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests::function_tool;

    #[test]
    fn truncation_is_char_based() {
        let long = "x".repeat(3000);
        assert_eq!(truncate_chars(&long, OUTPUT_PREVIEW_CHARS).len(), 2000);
        assert_eq!(truncate_chars("short", OUTPUT_PREVIEW_CHARS), "short");
    }

    #[tokio::test]
    async fn function_tool_receives_matching_kwargs() {
        let executor = ToolExecutor::new().unwrap();
        let tool = function_tool("echo", "def echo(msg):\n    return msg\n");

        let output = executor
            .execute(&tool, Some(&json!({"msg": "hi", "extra": "dropped"})))
            .await;
        assert_eq!(output, "\"hi\"");
    }

    #[tokio::test]
    async fn function_tool_retries_with_zero_args() {
        let executor = ToolExecutor::new().unwrap();
        let tool = function_tool("constant", "def constant():\n    return 42\n");

        // Payload keys match nothing; the harness falls back to a no-arg
        // call after the filtered invocation fails.
        let output = executor.execute(&tool, Some(&json!({"msg": "hi"}))).await;
        assert_eq!(output, "42");
    }

    #[tokio::test]
    async fn function_tool_error_is_a_string_not_a_crash() {
        let executor = ToolExecutor::new().unwrap();
        let tool = function_tool(
            "boom",
            "def boom():\n    raise RuntimeError('exploded')\n",
        );

        let output = executor.execute(&tool, None).await;
        assert!(output.contains("exploded"));
    }

    #[tokio::test]
    async fn function_tool_without_callable_reports_error() {
        let executor = ToolExecutor::new().unwrap();
        let tool = function_tool("empty", "x = 1\n");

        let output = executor.execute(&tool, None).await;
        assert!(output.contains("no callable defined"));
    }
}
