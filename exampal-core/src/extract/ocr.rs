//! Image OCR providers.
//!
//! The `OcrProvider` trait and `MockOcrProvider` are used in tests;
//! `VisionOcrProvider` sends the image to a vision-capable chat model on the
//! same OpenAI-compatible endpoint used for generation.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::{LlmConfig, OcrConfig};
use crate::error::ExtractError;

const OCR_INSTRUCTION: &str = "Transcribe all readable text in this image exactly as written. \
Preserve headings, lists and equations. Reply with the transcribed text only.";

/// Trait for image-to-text providers.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Extract readable text from an image file.
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// OCR through an OpenAI-compatible vision chat completion.
pub struct VisionOcrProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    timeout: Duration,
}

impl VisionOcrProvider {
    pub fn new(llm: &LlmConfig, ocr: &OcrConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            api_key: llm.resolve_api_key(),
            model: ocr.model.clone(),
            max_tokens: ocr.max_tokens,
            timeout: llm.request_timeout(),
        }
    }

    fn mime_for(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            _ => "image/jpeg",
        }
    }

    fn request_body(&self, data_url: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": OCR_INSTRUCTION },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ],
            }],
            "temperature": 0.0,
            "max_tokens": self.max_tokens,
        })
    }

    fn parse_text(body: &Value) -> Result<String, ExtractError> {
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ExtractError::Ocr {
                message: "No text in vision response".to_string(),
            })
    }
}

#[async_trait]
impl OcrProvider for VisionOcrProvider {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| ExtractError::Ocr {
            message: "API key is not set".to_string(),
        })?;
        let bytes = tokio::fs::read(path).await?;
        let data_url = format!("data:{};base64,{}", Self::mime_for(path), STANDARD.encode(&bytes));

        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, bytes = bytes.len(), "Sending vision OCR request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&self.request_body(&data_url))
            .send()
            .await
            .map_err(|e| ExtractError::Ocr {
                message: format!("Vision request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Ocr {
                message: format!("Vision API returned {status}: {body}"),
            });
        }

        let json: Value = response.json().await.map_err(|e| ExtractError::Ocr {
            message: format!("JSON parse error: {e}"),
        })?;
        Self::parse_text(&json)
    }

    fn name(&self) -> &str {
        "vision"
    }
}

/// A mock OCR provider for testing.
pub struct MockOcrProvider {
    responses: Mutex<Vec<Result<String, String>>>,
    call_count: AtomicUsize,
}

impl MockOcrProvider {
    /// Create a new mock that fails every call (no responses queued).
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Create a mock that returns `text` for the next call.
    pub fn with_text(text: &str) -> Self {
        let mock = Self::new();
        mock.queue(Ok(text.to_string()));
        mock
    }

    /// Queue a result; `Err` carries the failure reason.
    pub fn queue(&self, result: Result<String, String>) {
        self.responses.lock().unwrap().push(result);
    }

    /// Number of times `extract_text` was called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Default for MockOcrProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrProvider for MockOcrProvider {
    async fn extract_text(&self, _path: &Path) -> Result<String, ExtractError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ExtractError::Ocr {
                message: "no mock responses queued".into(),
            });
        }
        responses
            .remove(0)
            .map_err(|message| ExtractError::Ocr { message })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> VisionOcrProvider {
        VisionOcrProvider::new(
            &LlmConfig {
                api_key: Some("gsk_test".into()),
                base_url: "https://api.groq.com/openai/v1/".into(),
                ..LlmConfig::default()
            },
            &OcrConfig::default(),
        )
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(provider().base_url, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(VisionOcrProvider::mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(VisionOcrProvider::mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(VisionOcrProvider::mime_for(Path::new("a.jpeg")), "image/jpeg");
    }

    #[test]
    fn test_request_body_shape() {
        let body = provider().request_body("data:image/png;base64,AAAA");
        assert_eq!(body["model"], OcrConfig::default().model);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_parse_text() {
        let body = json!({"choices": [{"message": {"content": "Newton's laws"}}]});
        assert_eq!(VisionOcrProvider::parse_text(&body).unwrap(), "Newton's laws");
        assert!(VisionOcrProvider::parse_text(&json!({"choices": []})).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_io() {
        let provider = VisionOcrProvider::new(
            &LlmConfig {
                api_key: None,
                api_key_env: "EXAMPAL_TEST_UNSET_VARIABLE_XYZ".into(),
                ..LlmConfig::default()
            },
            &OcrConfig::default(),
        );
        let err = provider
            .extract_text(Path::new("/nonexistent/board.png"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API key is not set");
    }

    #[tokio::test]
    async fn test_mock_queue_and_count() {
        let mock = MockOcrProvider::with_text("first");
        mock.queue(Err("blurry".into()));
        assert_eq!(mock.extract_text(Path::new("a.png")).await.unwrap(), "first");
        let err = mock.extract_text(Path::new("a.png")).await.unwrap_err();
        assert_eq!(err.to_string(), "blurry");
        assert!(mock.extract_text(Path::new("a.png")).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }
}
