//! OpenAI-compatible chat-completion provider.
//!
//! Talks to Groq by default; any endpoint following the OpenAI chat
//! completions format works.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{ChatMessage, CompletionRequest, CompletionResponse, TokenUsage};

pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    default_timeout: Duration,
}

impl OpenAiCompatibleProvider {
    /// Create a provider from configuration.
    ///
    /// A missing key is not an error here; requests fail with
    /// `LlmError::MissingApiKey` and the liveness check reports invalid.
    pub fn new(config: &LlmConfig) -> Self {
        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            debug!(env = %config.api_key_env, "No API key configured");
        }
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
            default_timeout: config.request_timeout(),
        }
    }

    /// Convert chat messages to OpenAI JSON format.
    fn messages_to_json(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
            .collect()
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": Self::messages_to_json(&request.messages),
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice =
            body.get("choices")
                .and_then(|c| c.get(0))
                .ok_or_else(|| LlmError::ResponseParse {
                    message: "No choices in response".to_string(),
                })?;

        let message = choice
            .get("message")
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No message in choice".to_string(),
            })?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let usage_obj = body.get("usage");
        let usage = TokenUsage {
            input_tokens: usage_obj
                .and_then(|u| u.get("prompt_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
            output_tokens: usage_obj
                .and_then(|u| u.get("completion_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
        };

        let resp_model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(CompletionResponse {
            text,
            usage,
            model: resp_model,
            finish_reason,
        })
    }

    /// Upstream error text: `error.message` from a JSON body, else the raw
    /// body.
    fn error_detail(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("error")?.get("message")?.as_str().map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string())
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 => {
                warn!(body = %body, "Authentication failed (401)");
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                    detail: Self::error_detail(body),
                }
            }
            429 => {
                warn!(body = %body, "Rate limited (429)");
                let detail = Self::error_detail(body);
                // Groq phrases it as "... Please try again in 7.5s."
                let retry_secs = detail
                    .rsplit("in ")
                    .next()
                    .and_then(|tail| {
                        let secs: String = tail
                            .chars()
                            .take_while(|c| c.is_ascii_digit() || *c == '.')
                            .collect();
                        secs.parse::<f64>().ok().map(|s| s.ceil() as u64)
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                    detail,
                }
            }
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({status}): {body}"),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    fn map_transport_error(e: reqwest::Error, timeout: Duration) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                timeout_secs: timeout.as_secs(),
            }
        } else {
            LlmError::Connection {
                message: format!("Request failed: {e}"),
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey {
                var: self.api_key_env.clone(),
            })?;
        let url = format!("{}/chat/completions", self.base_url);
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let body = self.request_body(&request);

        debug!(url = %url, model = %self.model, messages = request.messages.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_transport_error(e, timeout))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| Self::map_transport_error(e, timeout))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {e}"),
            })?;

        Self::parse_response(&json, &self.model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}
