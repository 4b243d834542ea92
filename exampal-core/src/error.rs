//! Error types for the Exam Pal core.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering the LLM, material storage, text extraction, configuration, and
//! study-plan domains.

use std::path::PathBuf;

/// Top-level error type for the Exam Pal core library.
#[derive(Debug, thiserror::Error)]
pub enum ExamPalError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key not set (expected in environment variable {var})")]
    MissingApiKey { var: String },

    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}: {detail}")]
    AuthFailed { provider: String, detail: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s: {detail}")]
    RateLimited { retry_after_secs: u64, detail: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl LlmError {
    /// Whether the request never produced an HTTP response (connection
    /// failure, timeout, or an unreadable body).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout { .. } | LlmError::Connection { .. } | LlmError::ResponseParse { .. }
        )
    }
}

/// Errors from the upload directory.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No file selected")]
    EmptyFilename,

    #[error("File type not allowed. Supported types: {allowed}")]
    DisallowedExtension { allowed: String },

    #[error("Invalid filename: {name}")]
    InvalidFilename { name: String },

    #[error("Error saving file: {message}")]
    SaveFailed { message: String },

    #[error("Error reading upload directory {path}: {message}")]
    ListFailed { path: PathBuf, message: String },
}

/// Errors raised inside a text extractor. These never cross the extractor
/// boundary; they are folded into [`crate::extract::Extraction::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Pdf { message: String },

    #[error("{message}")]
    Ocr { message: String },

    #[error("OCR is disabled")]
    OcrDisabled,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from study-plan generation.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("No study materials have been uploaded")]
    NoMaterials,

    #[error("Groq API key is not set. Please set the {var} environment variable.")]
    MissingApiKey { var: String },

    #[error("Failed to generate study plan: {message}")]
    Generation { message: String },
}

/// A type alias for results using the top-level `ExamPalError`.
pub type Result<T> = std::result::Result<T, ExamPalError>;
