//! # Exam Pal Core
//!
//! Core library for the Exam Pal study assistant.
//! Provides material storage and text extraction, prompt budgeting and
//! composition, the LLM client (brain), chat history, the orchestrating
//! [`StudyAssistant`], and the HTTP gateway.

pub mod assistant;
pub mod brain;
pub mod budget;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod history;
pub mod plan;
pub mod prompt;
pub mod providers;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use assistant::StudyAssistant;
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use budget::{BudgetPolicy, TRUNCATION_MARKER};
pub use config::{ExamPalConfig, load_config};
pub use error::{ExamPalError, Result};
pub use history::{ChatHistory, SessionStore};
pub use store::MaterialStore;
pub use types::{
    ChatMessage, CompletionRequest, CompletionResponse, MaterialDescriptor, MaterialKind,
    Milestone, Role, StudyGoal, StudyPlan, TokenUsage,
};
