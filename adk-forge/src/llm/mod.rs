//! LLM client abstraction.
//!
//! Every provider sits behind [`LlmClient`] and returns a normalized
//! [`CompletionResult`], so the dispatcher never branches on provider identity.
//!
//! - [`OpenAiCompatibleClient`] talks to LM Studio, OpenAI, Groq, vLLM,
//!   Hugging Face and Azure OpenAI.
//! - [`AnthropicClient`] talks to the Anthropic messages API.
//! - [`MockLlmClient`] replays scripted responses for tests and dry runs.

pub mod anthropic;
pub mod mock;
pub mod openai_compatible;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use mock::MockLlmClient;
pub use openai_compatible::OpenAiCompatibleClient;
pub use retry::{is_transient, is_transient_status, send_with_retry, RetryConfig};

use crate::error::LlmError;
use crate::models::{LlmConfig, ProviderKind, MAX_TIMEOUT_SECONDS};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request overrides. Unset fields take the client's configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
}

impl CompletionOptions {
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Normalized provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    /// Generated text
    pub text: String,
    /// Provider response body as received
    pub raw: serde_json::Value,
    /// Model that served the request, as reported by the provider
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Uniform capability interface over LLM providers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider behind this client.
    fn provider(&self) -> ProviderKind;

    /// Model used when the request options do not name one.
    fn model(&self) -> &str;

    /// Single-prompt request.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResult, LlmError>;

    /// Role-tagged chat request.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<CompletionResult, LlmError>;

    /// True when the endpoint answers and lists at least one model. Never fails.
    async fn probe(&self) -> bool;
}

/// Request settings resolved from config and per-request options.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ResolvedRequest {
    pub(crate) fn new(config: &LlmConfig, options: &CompletionOptions) -> Self {
        // Overrides are clamped to the same ceiling as configured timeouts
        let max_timeout = Duration::from_secs(MAX_TIMEOUT_SECONDS);
        let timeout = options
            .timeout_seconds
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(|t| Duration::try_from_secs_f64(t).unwrap_or(max_timeout))
            .unwrap_or(Duration::from_secs(config.timeout_seconds))
            .min(max_timeout);
        Self {
            model: options
                .model
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| config.resolved_model().to_string()),
            temperature: options.temperature.unwrap_or(config.temperature),
            max_tokens: options.max_tokens.unwrap_or(config.max_tokens),
            timeout,
        }
    }
}

/// Build the client for the configured provider.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    match config.provider {
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicClient::new(config.clone())?)),
        _ => Ok(Arc::new(OpenAiCompatibleClient::new(config.clone())?)),
    }
}

/// Retry policy for a config: bounded attempts, total backoff capped by the timeout.
pub(crate) fn retry_config_for(config: &LlmConfig) -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(config.max_retries)
        .with_max_total_delay(Duration::from_secs(config.timeout_seconds))
}

/// Short excerpt of a response body for error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty body".to_string();
    }
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(LIMIT).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_request_defaults() {
        let config = LlmConfig::default();
        let resolved = ResolvedRequest::new(&config, &CompletionOptions::default());
        assert_eq!(resolved.model, "default");
        assert_eq!(resolved.temperature, 0.2);
        assert_eq!(resolved.max_tokens, 2000);
        assert_eq!(resolved.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_resolved_request_overrides() {
        let config = LlmConfig::default();
        let options = CompletionOptions::default()
            .with_model("qwen2.5-coder")
            .with_temperature(0.9)
            .with_max_tokens(64)
            .with_timeout_seconds(1.5);
        let resolved = ResolvedRequest::new(&config, &options);
        assert_eq!(resolved.model, "qwen2.5-coder");
        assert_eq!(resolved.temperature, 0.9);
        assert_eq!(resolved.max_tokens, 64);
        assert_eq!(resolved.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_resolved_request_clamps_huge_timeout() {
        let config = LlmConfig::default();
        let ceiling = Duration::from_secs(MAX_TIMEOUT_SECONDS);

        for secs in [1e20, f64::MAX, (MAX_TIMEOUT_SECONDS + 1) as f64] {
            let options = CompletionOptions::default().with_timeout_seconds(secs);
            assert_eq!(ResolvedRequest::new(&config, &options).timeout, ceiling, "{secs}");
        }

        for secs in [f64::NAN, f64::INFINITY, -3.0, 0.0] {
            let options = CompletionOptions::default().with_timeout_seconds(secs);
            assert_eq!(
                ResolvedRequest::new(&config, &options).timeout,
                Duration::from_secs(60),
                "{secs}"
            );
        }
    }

    #[test]
    fn test_build_client_per_provider() {
        let client = build_client(&LlmConfig::new(ProviderKind::Anthropic)).unwrap();
        assert_eq!(client.provider(), ProviderKind::Anthropic);

        let client = build_client(&LlmConfig::new(ProviderKind::Groq)).unwrap();
        assert_eq!(client.provider(), ProviderKind::Groq);
        assert_eq!(client.model(), "llama-3.1-70b-versatile");
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("  short  "), "short");
        let long = "x".repeat(400);
        let cut = truncate_body(&long);
        assert_eq!(cut.len(), 303);
        assert!(cut.ends_with("..."));
    }
}
