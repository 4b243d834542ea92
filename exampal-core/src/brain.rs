//! Brain module: the LLM provider abstraction and the model client used by
//! the assistant.
//!
//! `LlmProvider` is the seam to the remote chat-completion API. `Brain`
//! wraps one provider with the configured timeouts and accumulates token
//! usage across requests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{ChatMessage, CompletionRequest, CompletionResponse, TokenUsage};

/// Message sent by the key liveness check.
pub const KEY_CHECK_MESSAGE: &str = "Hello, are you working?";
/// Output limit for the key liveness check.
pub const KEY_CHECK_MAX_TOKENS: usize = 10;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Whether an API key is configured at all.
    fn has_api_key(&self) -> bool {
        true
    }

    /// Liveness check: a missing key or any failed minimal completion both
    /// count as an invalid key.
    async fn check_api_key(&self, timeout: Duration) -> bool {
        if !self.has_api_key() {
            warn!(model = self.model_name(), "API key is not set");
            return false;
        }
        let request = CompletionRequest {
            messages: vec![ChatMessage::user(KEY_CHECK_MESSAGE)],
            max_tokens: Some(KEY_CHECK_MAX_TOKENS),
            timeout: Some(timeout),
            ..Default::default()
        };
        match self.complete(request).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "API key validation failed");
                false
            }
        }
    }
}

/// The model client: one provider plus the configured request limits.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    validation_timeout: Duration,
    request_timeout: Duration,
    total_usage: Mutex<TokenUsage>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider,
            validation_timeout: config.validation_timeout(),
            request_timeout: config.request_timeout(),
            total_usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn has_api_key(&self) -> bool {
        self.provider.has_api_key()
    }

    /// Run the liveness check with the validation timeout.
    pub async fn is_api_key_valid(&self) -> bool {
        self.provider.check_api_key(self.validation_timeout).await
    }

    /// Issue one completion with the generation timeout. Never retried.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<CompletionResponse, LlmError> {
        let request = CompletionRequest {
            messages,
            temperature,
            max_tokens: Some(max_tokens),
            model: None,
            timeout: Some(self.request_timeout),
        };
        let response = self.provider.complete(request).await?;
        self.track_usage(&response.usage);
        info!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            "Completion received"
        );
        Ok(response)
    }

    fn track_usage(&self, usage: &TokenUsage) {
        if let Ok(mut total) = self.total_usage.lock() {
            total.input_tokens += usage.input_tokens;
            total.output_tokens += usage.output_tokens;
        }
    }

    /// Token usage accumulated since startup.
    pub fn total_usage(&self) -> TokenUsage {
        self.total_usage
            .lock()
            .map(|usage| *usage)
            .unwrap_or_default()
    }
}

/// A mock LLM provider for testing.
pub struct MockLlmProvider {
    model: String,
    has_key: bool,
    key_valid: AtomicBool,
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            has_key: true,
            key_valid: AtomicBool::new(true),
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that answers with the given text.
    ///
    /// Queues multiple copies of the response so it can handle multiple calls.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_response(Self::text_response(text));
        }
        provider
    }

    /// A mock with no configured key: `complete` fails with `MissingApiKey`.
    pub fn without_api_key() -> Self {
        Self {
            has_key: false,
            key_valid: AtomicBool::new(false),
            ..Self::new()
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push(Ok(response));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push(Err(error));
    }

    /// Control the outcome of the liveness check.
    pub fn set_key_valid(&self, valid: bool) {
        self.key_valid.store(valid, Ordering::Relaxed);
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Requests received by `complete`, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        if !self.has_key {
            return Err(LlmError::MissingApiKey {
                var: "GROQ_API_KEY".to_string(),
            });
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(MockLlmProvider::text_response(
                "I'm a mock LLM. No queued responses available.",
            ))
        } else {
            responses.remove(0)
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn has_api_key(&self) -> bool {
        self.has_key
    }

    // Answers from the flag so key checks never consume queued responses.
    async fn check_api_key(&self, _timeout: Duration) -> bool {
        self.has_key && self.key_valid.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    /// Provider relying on the default key check implementation.
    struct DefaultCheckOnly {
        inner: MockLlmProvider,
    }

    #[async_trait]
    impl LlmProvider for DefaultCheckOnly {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.inner.complete(request).await
        }

        fn model_name(&self) -> &str {
            "default-check-only"
        }

        fn has_api_key(&self) -> bool {
            self.inner.has_api_key()
        }
    }

    fn brain(provider: Arc<dyn LlmProvider>) -> Brain {
        Brain::new(provider, &LlmConfig::default())
    }

    #[tokio::test]
    async fn test_mock_default_response() {
        let provider = MockLlmProvider::new();
        let response = provider.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(response.text, "I'm a mock LLM. No queued responses available.");
    }

    #[tokio::test]
    async fn test_mock_queue_order_and_errors() {
        let provider = MockLlmProvider::new();
        provider.queue_response(MockLlmProvider::text_response("first"));
        provider.queue_error(LlmError::Timeout { timeout_secs: 30 });

        let first = provider.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(first.text, "first");
        let second = provider.complete(CompletionRequest::default()).await;
        assert!(matches!(second, Err(LlmError::Timeout { .. })));
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_without_key() {
        let provider = MockLlmProvider::without_api_key();
        assert!(!provider.has_api_key());
        assert!(!provider.check_api_key(Duration::from_secs(5)).await);
        let result = provider.complete(CompletionRequest::default()).await;
        assert!(matches!(result, Err(LlmError::MissingApiKey { .. })));
    }

    #[tokio::test]
    async fn test_mock_key_check_does_not_consume_queue() {
        let provider = MockLlmProvider::with_response("queued");
        assert!(provider.check_api_key(Duration::from_secs(5)).await);
        provider.set_key_valid(false);
        assert!(!provider.check_api_key(Duration::from_secs(5)).await);
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_default_key_check_sends_minimal_request() {
        let provider = DefaultCheckOnly {
            inner: MockLlmProvider::new(),
        };
        assert!(provider.check_api_key(Duration::from_secs(5)).await);

        let requests = provider.inner.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages, vec![ChatMessage::user(KEY_CHECK_MESSAGE)]);
        assert_eq!(requests[0].max_tokens, Some(KEY_CHECK_MAX_TOKENS));
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_default_key_check_failure_is_invalid() {
        let inner = MockLlmProvider::new();
        inner.queue_error(LlmError::AuthFailed {
            provider: "groq".into(),
            detail: "Invalid API Key".into(),
        });
        let provider = DefaultCheckOnly { inner };
        assert!(!provider.check_api_key(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_default_key_check_without_key_makes_no_request() {
        let provider = DefaultCheckOnly {
            inner: MockLlmProvider::without_api_key(),
        };
        assert!(!provider.check_api_key(Duration::from_secs(5)).await);
        assert_eq!(provider.inner.request_count(), 0);
    }

    #[tokio::test]
    async fn test_brain_complete_applies_limits_and_tracks_usage() {
        let provider = Arc::new(MockLlmProvider::with_response("plan"));
        let brain = brain(provider.clone());

        let response = brain
            .complete(vec![ChatMessage::system("s"), ChatMessage::user("u")], 0.8, 1000)
            .await
            .unwrap();
        assert_eq!(response.text, "plan");
        brain.complete(vec![ChatMessage::user("again")], 0.7, 4000).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests[0].temperature, 0.8);
        assert_eq!(requests[0].max_tokens, Some(1000));
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(30)));
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(brain.total_usage().total(), 300);
    }

    #[tokio::test]
    async fn test_brain_key_check_delegates() {
        let brain = brain(Arc::new(MockLlmProvider::without_api_key()));
        assert!(!brain.has_api_key());
        assert!(!brain.is_api_key_valid().await);
    }
}
