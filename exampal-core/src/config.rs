//! Configuration system for Exam Pal.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment.
//! Configuration is loaded from `~/.config/exampal/config.toml` and/or
//! `exampal.toml` in the working directory. The binary applies CLI flags on top.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::budget::BudgetPolicy;
use crate::error::ConfigError;

/// Top-level configuration for the Exam Pal service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamPalConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub ocr: OcrConfig,
    pub budget: BudgetConfig,
    pub chat: ChatConfig,
}

impl ExamPalConfig {
    /// Collect warnings from every section.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        warnings.extend(self.server.validate());
        warnings.extend(self.llm.validate());
        warnings.extend(self.budget.validate());
        warnings.extend(self.chat.validate());
        warnings
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Optional directory with the browser frontend, served at `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
    /// Name of the cookie carrying the session id.
    pub session_cookie: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_body_bytes: 16 * 1024 * 1024,
            static_dir: None,
            session_cookie: "exampal_session".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_body_bytes == 0 {
            warnings.push("server.max_body_bytes is 0; every upload will be rejected".into());
        }
        if self.session_cookie.is_empty()
            || self
                .session_cookie
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, ';' | ',' | '='))
        {
            warnings.push(format!(
                "server.session_cookie ({:?}) is not a valid cookie name",
                self.session_cookie
            ));
        }
        warnings
    }
}

/// Upload directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded materials. Created on startup.
    pub upload_dir: PathBuf,
    /// Lowercase file extensions (without dot) accepted for upload.
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            allowed_extensions: vec![
                "pdf".to_string(),
                "png".to_string(),
                "jpg".to_string(),
                "jpeg".to_string(),
            ],
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Timeout for the key liveness check.
    pub validation_timeout_secs: u64,
    /// Timeout for plan and chat generation.
    pub request_timeout_secs: u64,
    pub plan_temperature: f32,
    pub plan_max_tokens: usize,
    pub chat_temperature: f32,
    pub chat_max_tokens: usize,
    /// Run the key liveness check before every plan or chat request.
    pub validate_key_per_request: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-70b-8192".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            api_key: None,
            validation_timeout_secs: 5,
            request_timeout_secs: 30,
            plan_temperature: 0.7,
            plan_max_tokens: 4000,
            chat_temperature: 0.8,
            chat_max_tokens: 1000,
            validate_key_per_request: true,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key: explicit value first, then the configured
    /// environment variable. Empty strings count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate this LLM config and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid. Returns human-readable
    /// warning messages for problematic values (does not error).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, value) in [
            ("plan_temperature", self.plan_temperature),
            ("chat_temperature", self.chat_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                warnings.push(format!(
                    "llm.{name} ({value}) is outside the typical range 0.0-2.0"
                ));
            }
        }
        if self.validation_timeout_secs == 0 || self.request_timeout_secs == 0 {
            warnings.push("llm timeouts of 0s will fail every request".to_string());
        }
        if self.validation_timeout_secs > self.request_timeout_secs {
            warnings.push(format!(
                "llm.validation_timeout_secs ({}) exceeds request_timeout_secs ({})",
                self.validation_timeout_secs, self.request_timeout_secs
            ));
        }
        warnings
    }
}

/// Image OCR configuration. OCR runs through the vision-capable chat model
/// of the same provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub enabled: bool,
    /// Vision model used for image text extraction.
    pub model: String,
    pub max_tokens: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "llama-3.2-11b-vision-preview".to_string(),
            max_tokens: 2048,
        }
    }
}

/// Character budgets for material text embedded in prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub plan: BudgetPolicy,
    pub chat: BudgetPolicy,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            plan: BudgetPolicy {
                per_item_cap: 2000,
                total_cap: 8000,
                final_cap: 8000,
            },
            chat: BudgetPolicy {
                per_item_cap: 2500,
                total_cap: 10_000,
                final_cap: 12_000,
            },
        }
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, policy) in [("plan", &self.plan), ("chat", &self.chat)] {
            if policy.per_item_cap > policy.total_cap {
                warnings.push(format!(
                    "budget.{name}.per_item_cap ({}) exceeds total_cap ({})",
                    policy.per_item_cap, policy.total_cap
                ));
            }
            if policy.final_cap < policy.total_cap {
                warnings.push(format!(
                    "budget.{name}.final_cap ({}) is below total_cap ({}); material text will be cut twice",
                    policy.final_cap, policy.total_cap
                ));
            }
        }
        warnings
    }
}

/// Chat history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum stored entries per session.
    pub history_limit: usize,
    /// Most recent entries sent with each chat request.
    pub request_window: usize,
    /// Live sessions kept in memory; the least recently used is evicted.
    pub max_sessions: usize,
    /// Sessions idle longer than this are dropped.
    pub session_ttl_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            request_window: 10,
            max_sessions: 1000,
            session_ttl_secs: 6 * 60 * 60,
        }
    }
}

impl ChatConfig {
    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_sessions == 0 {
            warnings.push("chat.max_sessions is 0; one session will still be kept".to_string());
        }
        if self.session_ttl_secs == 0 {
            warnings.push(
                "chat.session_ttl_secs is 0; chat history is dropped between requests".to_string(),
            );
        }
        if self.request_window > self.history_limit {
            warnings.push(format!(
                "chat.request_window ({}) exceeds history_limit ({}); the window can never be full",
                self.request_window, self.history_limit
            ));
        }
        warnings
    }
}

/// Load configuration from all sources, merging in priority order.
///
/// Priority (highest to lowest):
/// 1. Explicit config file (passed as argument)
/// 2. Environment variables (prefixed with `EXAMPAL_`)
/// 3. Workspace-local config (`exampal.toml`)
/// 4. User config (`~/.config/exampal/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<ExamPalConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ExamPalConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "exampal", "exampal") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join("exampal.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (EXAMPAL_SERVER__PORT, EXAMPAL_LLM__MODEL, etc.)
    figment = figment.merge(Env::prefixed("EXAMPAL_").split("__"));

    // An explicitly named file must exist; figment treats missing files as empty.
    if let Some(path) = config_file {
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
