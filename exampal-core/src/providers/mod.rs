//! LLM provider implementations.
//!
//! Use `create_provider()` to build the provider described by the config.

pub mod openai_compat;

use std::sync::Arc;
use tracing::info;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;

pub use openai_compat::OpenAiCompatibleProvider;

/// Build the configured chat-completion provider.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    let provider = OpenAiCompatibleProvider::new(config);
    info!(
        base_url = %config.base_url,
        model = %config.model,
        has_api_key = provider.has_api_key(),
        "Created LLM provider"
    );
    Arc::new(provider)
}
