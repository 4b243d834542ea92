//! Core type definitions for Exam Pal.
//!
//! Defines the records that flow through the pipeline: chat messages,
//! material descriptors, study goals and plans, and the completion
//! request/response pair exchanged with LLM providers.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extract::Extraction;

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single role-tagged chat entry. Serialized as `{role, content}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Kind of an uploaded material, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Pdf,
    Image,
    Unknown,
}

impl MaterialKind {
    /// Classify a lowercase or mixed-case extension (with or without a dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => MaterialKind::Pdf,
            "png" | "jpg" | "jpeg" => MaterialKind::Image,
            _ => MaterialKind::Unknown,
        }
    }

    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(MaterialKind::Unknown)
    }
}

impl std::fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaterialKind::Pdf => write!(f, "pdf"),
            MaterialKind::Image => write!(f, "image"),
            MaterialKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A stored material file and, once extracted, its text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    /// Extraction result; serialized as its rendered text under `content`.
    #[serde(rename = "content", skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Extraction>,
}

impl MaterialDescriptor {
    /// Text contributed to prompts. Missing extractions contribute nothing.
    pub fn text(&self) -> String {
        self.extraction
            .as_ref()
            .map(Extraction::render)
            .unwrap_or_default()
    }

    pub fn with_extraction(mut self, extraction: Extraction) -> Self {
        self.extraction = Some(extraction);
        self
    }

    /// Copy of this descriptor without extracted content.
    pub fn without_content(&self) -> Self {
        Self {
            extraction: None,
            ..self.clone()
        }
    }
}

/// What the student wants out of the exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyGoal {
    Pass,
    Good,
    Ace,
    Master,
    Unrecognized,
}

impl StudyGoal {
    /// Parse a goal label; anything unknown degrades to `Unrecognized`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "pass" => StudyGoal::Pass,
            "good" => StudyGoal::Good,
            "ace" => StudyGoal::Ace,
            "master" => StudyGoal::Master,
            _ => StudyGoal::Unrecognized,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StudyGoal::Pass => "just pass the exam with minimal effort",
            StudyGoal::Good => "get a good grade (B or equivalent)",
            StudyGoal::Ace => "ace the exam (A or equivalent)",
            StudyGoal::Master => "master the material completely for long-term knowledge",
            StudyGoal::Unrecognized => "do well on the exam",
        }
    }
}

/// A generated study plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    #[serde(default, deserialize_with = "lenient_text")]
    pub overview: String,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl StudyPlan {
    /// Degraded plan carrying unparsed model output as the overview.
    pub fn from_raw_text(text: impl Into<String>) -> Self {
        Self {
            overview: text.into(),
            milestones: Vec::new(),
        }
    }
}

/// A dated checkpoint in a study plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_optional_text")]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient_texts")]
    pub tasks: Vec<String>,
}

/// Render any JSON scalar as text; models occasionally emit numbers or
/// nested values where strings are expected.
fn value_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    serde_json::Value::deserialize(deserializer).map(value_to_text)
}

fn lenient_optional_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => None,
        other => Some(value_to_text(other)),
    })
}

fn lenient_texts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items.into_iter().map(value_to_text).collect(),
        serde_json::Value::Null => Vec::new(),
        other => vec![value_to_text(other)],
    })
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// A request to the LLM for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub model: Option<String>,
    /// Upper bound on the whole HTTP exchange.
    pub timeout: Option<Duration>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: None,
            model: None,
            timeout: None,
        }
    }
}

/// The top completion returned by a provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}
