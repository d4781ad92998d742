//! Adapter for OpenAI-style chat and completion endpoints.
//!
//! LM Studio, OpenAI, Groq, vLLM and the Hugging Face router all expose
//! `{base}/chat/completions`, `{base}/completions` and `{base}/models`.
//! Azure OpenAI routes by deployment and authenticates with an `api-key`
//! header instead of a bearer token.

use super::retry::{send_with_retry, RetryConfig};
use super::{
    retry_config_for, truncate_body, ChatMessage, CompletionOptions, CompletionResult, LlmClient,
    ResolvedRequest, TokenUsage,
};
use crate::error::LlmError;
use crate::models::{LlmConfig, ProviderKind};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
enum Route {
    Chat,
    Completion,
    Models,
}

/// Client for OpenAI-compatible providers.
pub struct OpenAiCompatibleClient {
    config: LlmConfig,
    http: Client,
    api_base: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("provider", &self.config.provider)
            .field("api_base", &self.api_base)
            .field("model", &self.config.resolved_model())
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiCompatibleClient {
    /// Create a client. The API key is read from the configured env var.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let provider = config.provider.as_str();
        let api_base = config.resolved_api_base().ok_or_else(|| {
            LlmError::configuration(provider, "no api_base configured and no provider default")
        })?;

        let http = Client::builder()
            .build()
            .map_err(|e| LlmError::configuration(provider, format!("failed to build HTTP client: {e}")))?;

        let api_key = config.api_key();
        if api_key.is_none() && config.provider.requires_api_key() {
            warn!(
                provider = %provider,
                env = %config.resolved_api_key_env(),
                "API key not set; requests will be sent unauthenticated"
            );
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

    fn name(&self) -> &'static str {
        self.config.provider.as_str()
    }

    fn endpoint(&self, route: Route, model: &str) -> String {
        if self.config.provider == ProviderKind::Azure {
            let version = &self.config.api_version;
            return match route {
                Route::Chat => format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    self.api_base, model, version
                ),
                Route::Completion => format!(
                    "{}/openai/deployments/{}/completions?api-version={}",
                    self.api_base, model, version
                ),
                Route::Models => format!("{}/openai/models?api-version={}", self.api_base, version),
            };
        }

        match route {
            Route::Chat => format!("{}/chat/completions", self.api_base),
            Route::Completion => format!("{}/completions", self.api_base),
            Route::Models => format!("{}/models", self.api_base),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.api_key, self.config.provider) {
            (Some(key), ProviderKind::Azure) => request.header("api-key", key),
            (Some(key), _) => request.bearer_auth(key),
            (None, _) => request,
        }
    }

    async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<Value, LlmError> {
        debug!(provider = %self.name(), url = %url, "Sending LLM request");
        let response = self
            .authorize(self.http.post(url))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::http_status(self.name(), status.as_u16(), truncate_body(&text)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LlmError::response(self.name(), format!("invalid JSON body: {e}")))
    }

    async fn request(&self, route: Route, body: Value, resolved: &ResolvedRequest) -> Result<CompletionResult, LlmError> {
        let url = self.endpoint(route, &resolved.model);
        let url = url.as_str();
        let body = &body;
        let timeout = resolved.timeout;

        let raw = send_with_retry(&self.retry, || {
            self.post_json(url, body, timeout)
        })
        .await?;

        let text = extract_text(&raw).ok_or_else(|| {
            LlmError::response(
                self.name(),
                "no text in choices[0].message.content or choices[0].text",
            )
        })?;

        Ok(CompletionResult {
            text,
            model: raw
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(resolved.model.as_str())
                .to_string(),
            usage: extract_usage(&raw),
            raw,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    fn model(&self) -> &str {
        self.config.resolved_model()
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<CompletionResult, LlmError> {
        let resolved = ResolvedRequest::new(&self.config, options);
        let body = json!({
            "model": resolved.model,
            "prompt": prompt,
            "temperature": resolved.temperature,
            "max_tokens": resolved.max_tokens,
        });
        self.request(Route::Completion, body, &resolved).await
    }

    async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<CompletionResult, LlmError> {
        let resolved = ResolvedRequest::new(&self.config, options);
        let body = json!({
            "model": resolved.model,
            "messages": messages,
            "temperature": resolved.temperature,
            "max_tokens": resolved.max_tokens,
        });
        self.request(Route::Chat, body, &resolved).await
    }

    async fn probe(&self) -> bool {
        let url = self.endpoint(Route::Models, self.config.resolved_model());
        let timeout = PROBE_TIMEOUT.min(Duration::from_secs(self.config.timeout_seconds));
        let response = match self.authorize(self.http.get(&url)).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(provider = %self.name(), error = %e, "Probe failed to connect");
                return false;
            }
        };

        if !response.status().is_success() {
            debug!(provider = %self.name(), status = %response.status(), "Probe returned an error status");
            return false;
        }

        match response.json::<Value>().await {
            Ok(body) => count_models(&body) > 0,
            Err(e) => {
                debug!(provider = %self.name(), error = %e, "Probe body is not JSON");
                false
            }
        }
    }
}

pub(crate) fn transport_error(provider: &str, err: reqwest::Error, timeout: Duration) -> LlmError {
    if err.is_timeout() {
        LlmError::unavailable(provider, format!("request timed out after {:.1}s", timeout.as_secs_f64()))
    } else if err.is_connect() {
        LlmError::unavailable(provider, format!("connection failed: {err}"))
    } else {
        LlmError::unavailable(provider, err.to_string())
    }
}

/// Generated text from an OpenAI-style body.
fn extract_text(raw: &Value) -> Option<String> {
    let choice = raw.get("choices")?.get(0)?;

    if let Some(content) = choice.get("message").and_then(|m| m.get("content")) {
        match content {
            Value::String(text) => return Some(text.clone()),
            // Some servers return content parts instead of a string.
            Value::Array(parts) => {
                let text: Vec<&str> = parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect();
                if !text.is_empty() {
                    return Some(text.concat());
                }
            }
            _ => {}
        }
    }

    choice.get("text").and_then(Value::as_str).map(str::to_string)
}

fn extract_usage(raw: &Value) -> Option<TokenUsage> {
    let usage = raw.get("usage")?;
    Some(TokenUsage {
        prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
    })
}

/// Models listed by a `/models` body: `{"data": [...]}`, `{"models": [...]}` or a bare array.
pub(crate) fn count_models(body: &Value) -> usize {
    body.get("data")
        .or_else(|| body.get("models"))
        .unwrap_or(body)
        .as_array()
        .map(Vec::len)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_chat_shape() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        assert_eq!(extract_text(&raw).as_deref(), Some("hello"));
    }

    #[test]
    fn test_extract_text_completion_shape() {
        let raw = json!({"choices": [{"text": "body { }"}]});
        assert_eq!(extract_text(&raw).as_deref(), Some("body { }"));
    }

    #[test]
    fn test_extract_text_content_parts() {
        let raw = json!({"choices": [{"message": {"content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}}]});
        assert_eq!(extract_text(&raw).as_deref(), Some("ab"));
    }

    #[test]
    fn test_extract_text_missing() {
        assert_eq!(extract_text(&json!({"choices": []})), None);
        assert_eq!(extract_text(&json!({"error": "nope"})), None);
        assert_eq!(extract_text(&json!({"choices": [{"message": {"content": null}}]})), None);
    }

    #[test]
    fn test_count_models() {
        assert_eq!(count_models(&json!({"data": [{"id": "a"}, {"id": "b"}]})), 2);
        assert_eq!(count_models(&json!({"models": [{"name": "a"}]})), 1);
        assert_eq!(count_models(&json!([{"id": "a"}])), 1);
        assert_eq!(count_models(&json!({"data": []})), 0);
        assert_eq!(count_models(&json!({"object": "list"})), 0);
    }

    #[test]
    fn test_endpoints() {
        let client = OpenAiCompatibleClient::new(LlmConfig::new(ProviderKind::Groq)).unwrap();
        assert_eq!(
            client.endpoint(Route::Chat, "m"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(client.endpoint(Route::Models, "m"), "https://api.groq.com/openai/v1/models");

        let azure = OpenAiCompatibleClient::new(
            LlmConfig::new(ProviderKind::Azure).with_api_base("https://res.openai.azure.com/"),
        )
        .unwrap();
        assert_eq!(
            azure.endpoint(Route::Chat, "gpt-4"),
            "https://res.openai.azure.com/openai/deployments/gpt-4/chat/completions?api-version=2023-05-15"
        );
    }

    #[test]
    fn test_azure_without_base_fails() {
        let err = OpenAiCompatibleClient::new(LlmConfig::new(ProviderKind::Azure)).unwrap_err();
        assert!(matches!(err, LlmError::Configuration { .. }));
    }
}
