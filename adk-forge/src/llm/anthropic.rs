//! Adapter for the Anthropic messages API.

use super::openai_compatible::{count_models, transport_error};
use super::retry::{send_with_retry, RetryConfig};
use super::{
    retry_config_for, truncate_body, ChatMessage, CompletionOptions, CompletionResult, LlmClient,
    ResolvedRequest, Role, TokenUsage,
};
use crate::error::LlmError;
use crate::models::{LlmConfig, ProviderKind};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for `POST {base}/v1/messages`.
pub struct AnthropicClient {
    config: LlmConfig,
    http: Client,
    api_base: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_base", &self.api_base)
            .field("model", &self.config.resolved_model())
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl AnthropicClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let api_base = config
            .resolved_api_base()
            .ok_or_else(|| LlmError::configuration("anthropic", "no api_base configured"))?;

        let http = Client::builder()
            .build()
            .map_err(|e| LlmError::configuration("anthropic", format!("failed to build HTTP client: {e}")))?;

        let api_key = config.api_key();
        if api_key.is_none() {
            warn!(env = %config.resolved_api_key_env(), "Anthropic API key not set");
        }

        let retry = retry_config_for(&config);
        Ok(Self {
            config,
            http,
            api_base,
            api_key,
            retry,
        })
    }

    /// Use an explicit API key instead of the environment.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Replace the retry policy.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("anthropic-version", ANTHROPIC_VERSION);
        match self.api_key {
            Some(ref key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn post_messages(&self, body: &Value, timeout: Duration) -> Result<Value, LlmError> {
        let url = format!("{}/v1/messages", self.api_base);
        debug!(url = %url, "Sending Anthropic request");
        let response = self
            .authorize(self.http.post(&url))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error("anthropic", e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::http_status("anthropic", status.as_u16(), truncate_body(&text)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LlmError::response("anthropic", format!("invalid JSON body: {e}")))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        self.config.resolved_model()
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<CompletionResult, LlmError> {
        self.chat(&[ChatMessage::user(prompt)], options).await
    }

    async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<CompletionResult, LlmError> {
        let resolved = ResolvedRequest::new(&self.config, options);
        let body = build_body(messages, &resolved);
        let body = &body;
        let timeout = resolved.timeout;

        let raw = send_with_retry(&self.retry, || {
            self.post_messages(body, timeout)
        })
        .await?;

        let text = extract_text(&raw)
            .ok_or_else(|| LlmError::response("anthropic", "no text blocks in content"))?;

        Ok(CompletionResult {
            text,
            model: raw
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(resolved.model.as_str())
                .to_string(),
            usage: raw.get("usage").map(|usage| TokenUsage {
                prompt_tokens: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
                completion_tokens: usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
            }),
            raw,
        })
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/v1/models", self.api_base);
        let timeout = PROBE_TIMEOUT.min(Duration::from_secs(self.config.timeout_seconds));
        match self.authorize(self.http.get(&url)).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<Value>()
                .await
                .map(|body| count_models(&body) > 0)
                .unwrap_or(false),
            Ok(response) => {
                debug!(status = %response.status(), "Anthropic probe returned an error status");
                false
            }
            Err(e) => {
                debug!(error = %e, "Anthropic probe failed to connect");
                false
            }
        }
    }
}

/// System messages are lifted into the top-level `system` field.
fn build_body(messages: &[ChatMessage], resolved: &ResolvedRequest) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let turns: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({"role": m.role, "content": m.content}))
        .collect();

    let mut body = json!({
        "model": resolved.model,
        "max_tokens": resolved.max_tokens,
        "temperature": resolved.temperature.min(1.0),
        "messages": turns,
    });
    if !system.is_empty() {
        body["system"] = Value::String(system.join("\n\n"));
    }
    body
}

fn extract_text(raw: &Value) -> Option<String> {
    let blocks = raw.get("content")?.as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str).unwrap_or("text") == "text")
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved() -> ResolvedRequest {
        ResolvedRequest::new(&LlmConfig::new(ProviderKind::Anthropic), &CompletionOptions::default())
    }

    #[test]
    fn test_build_body_lifts_system() {
        let messages = [ChatMessage::system("be terse"), ChatMessage::user("hi")];
        let body = build_body(&messages, &resolved());
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["model"], "claude-3-sonnet-20240229");
    }

    #[test]
    fn test_build_body_clamps_temperature() {
        let mut resolved = resolved();
        resolved.temperature = 1.8;
        let body = build_body(&[ChatMessage::user("hi")], &resolved);
        assert_eq!(body["temperature"], 1.0);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_extract_text() {
        let raw = json!({"content": [{"type": "text", "text": "a"}, {"type": "tool_use", "id": "x"}, {"type": "text", "text": "b"}]});
        assert_eq!(extract_text(&raw).as_deref(), Some("ab"));
        assert_eq!(extract_text(&json!({"content": []})), None);
        assert_eq!(extract_text(&json!({"type": "error"})), None);
    }
}
