use super::{ChatMessage, CompletionOptions, CompletionResult, LlmClient, Role};
use crate::error::LlmError;
use crate::models::ProviderKind;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Scripted client. Replies are consumed in order; once the script runs out
/// the fallback reply repeats.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Result<String, LlmError>,
    reachable: bool,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(String::new()),
            reachable: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `LlmError::Unavailable`.
    pub fn unavailable() -> Self {
        Self {
            fallback: Err(LlmError::unavailable("mock", "connection refused")),
            reachable: false,
            ..Self::new()
        }
    }

    /// Queue a text reply.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: LlmError) -> Self {
        self.push(Err(error));
        self
    }

    /// Reply used after the script is exhausted.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Ok(text.into());
        self
    }

    /// Prompts received so far, in call order. Chat calls record the joined
    /// non-system messages.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn push(&self, reply: Result<String, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    fn next_reply(&self, prompt: String) -> Result<CompletionResult, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt);
        }
        let reply = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        reply.map(|text| CompletionResult {
            raw: serde_json::json!({ "text": text }),
            text,
            model: "mock".to_string(),
            usage: None,
        })
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::LmStudio
    }

    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<CompletionResult, LlmError> {
        self.next_reply(prompt.to_string())
    }

    async fn chat(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<CompletionResult, LlmError> {
        let prompt = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.next_reply(prompt)
    }

    async fn probe(&self) -> bool {
        self.reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let client = MockLlmClient::new()
            .with_response("first")
            .with_error(LlmError::response("mock", "empty"))
            .with_fallback("again");
        let options = CompletionOptions::default();

        assert_eq!(client.complete("a", &options).await.unwrap().text, "first");
        assert!(client.complete("b", &options).await.is_err());
        assert_eq!(client.complete("c", &options).await.unwrap().text, "again");
        assert_eq!(client.complete("d", &options).await.unwrap().text, "again");
        assert_eq!(client.prompts(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let client = MockLlmClient::unavailable();
        assert!(!client.probe().await);
        let err = client
            .chat(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable { .. }));
        assert_eq!(client.call_count(), 1);
    }
}
