//! The study assistant: wires the material store, text extraction, prompt
//! composition and the model client into the plan and chat features.

use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::brain::{Brain, LlmProvider};
use crate::config::ExamPalConfig;
use crate::error::{LlmError, PlanError, StoreError};
use crate::extract::{FileExtractor, OcrProvider, PdfExtractor, TextExtractor, VisionOcrProvider};
use crate::history::ChatHistory;
use crate::plan::parse_study_plan;
use crate::prompt::PromptComposer;
use crate::providers::create_provider;
use crate::store::MaterialStore;
use crate::types::{MaterialDescriptor, StudyGoal, StudyPlan};

pub const NO_MATERIALS_REPLY: &str = "I don't see any study materials uploaded yet. Please upload your notes, textbooks, or any resources you'd like me to help you with!";
pub const MISSING_KEY_REPLY: &str = "Sorry, I can't respond right now because the Groq API key is not set. Please set the GROQ_API_KEY environment variable.";
pub const HTTP_FAILURE_REPLY: &str =
    "Sorry, I'm having trouble connecting to my brain. Try asking me something else!";
pub const TRANSPORT_FAILURE_REPLY: &str =
    "Oops, something went wrong on my end. Can you try again with a different question?";

/// Chat reply for a failed model call.
pub fn fallback_reply(error: &LlmError) -> &'static str {
    match error {
        LlmError::MissingApiKey { .. } => MISSING_KEY_REPLY,
        e if e.is_transport() => TRANSPORT_FAILURE_REPLY,
        _ => HTTP_FAILURE_REPLY,
    }
}

pub struct StudyAssistant {
    store: MaterialStore,
    extractor: Arc<dyn TextExtractor>,
    brain: Brain,
    composer: PromptComposer,
    api_key_env: String,
    plan_temperature: f32,
    plan_max_tokens: usize,
    chat_temperature: f32,
    chat_max_tokens: usize,
    validate_key_per_request: bool,
}

impl StudyAssistant {
    /// Build the assistant with the configured remote provider, PDF
    /// extraction and (if enabled) vision OCR.
    pub fn from_config(config: &ExamPalConfig) -> Self {
        let provider = create_provider(&config.llm);
        let ocr: Option<Arc<dyn OcrProvider>> = if config.ocr.enabled {
            Some(Arc::new(VisionOcrProvider::new(&config.llm, &config.ocr)))
        } else {
            None
        };
        let extractor = Arc::new(FileExtractor::new(PdfExtractor::new(), ocr));
        Self::new(config, provider, extractor)
    }

    pub fn new(
        config: &ExamPalConfig,
        provider: Arc<dyn LlmProvider>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            store: MaterialStore::new(&config.storage),
            extractor,
            brain: Brain::new(provider, &config.llm),
            composer: PromptComposer::new(config.budget.clone(), &config.chat),
            api_key_env: config.llm.api_key_env.clone(),
            plan_temperature: config.llm.plan_temperature,
            plan_max_tokens: config.llm.plan_max_tokens,
            chat_temperature: config.llm.chat_temperature,
            chat_max_tokens: config.llm.chat_max_tokens,
            validate_key_per_request: config.llm.validate_key_per_request,
        }
    }

    pub fn store(&self) -> &MaterialStore {
        &self.store
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    /// Whether plan and chat requests must pass the key check first.
    pub fn validates_key_per_request(&self) -> bool {
        self.validate_key_per_request
    }

    pub async fn is_api_key_valid(&self) -> bool {
        self.brain.is_api_key_valid().await
    }

    /// Save an upload and attach its extracted text.
    pub async fn ingest(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<MaterialDescriptor, StoreError> {
        let saved = self.store.save(filename, bytes).await?;
        let extraction = self.extractor.extract(&saved.path, saved.kind).await;
        info!(name = %saved.name, failed = extraction.is_failure(), "Processed upload");
        Ok(saved.with_extraction(extraction))
    }

    /// Descriptors for every stored file, without content. A directory that
    /// cannot be read lists as empty.
    pub async fn list_files(&self) -> Vec<MaterialDescriptor> {
        match self.store.list().await {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "Error getting uploaded files");
                Vec::new()
            }
        }
    }

    /// Every stored file with freshly extracted text, in name order.
    pub async fn materials(&self) -> Vec<MaterialDescriptor> {
        let files = self.list_files().await;
        let extractions = futures::future::join_all(
            files
                .iter()
                .map(|file| self.extractor.extract(&file.path, file.kind)),
        )
        .await;
        files
            .into_iter()
            .zip(extractions)
            .map(|(file, extraction)| file.with_extraction(extraction))
            .collect()
    }

    /// Generate a study plan against the current local time.
    pub async fn generate_plan(
        &self,
        goal: StudyGoal,
        deadline: &str,
    ) -> Result<StudyPlan, PlanError> {
        self.generate_plan_at(goal, deadline, Local::now().naive_local())
            .await
    }

    pub async fn generate_plan_at(
        &self,
        goal: StudyGoal,
        deadline: &str,
        now: NaiveDateTime,
    ) -> Result<StudyPlan, PlanError> {
        let materials = self.materials().await;
        if materials.is_empty() {
            return Err(PlanError::NoMaterials);
        }
        if !self.brain.has_api_key() {
            warn!(env = %self.api_key_env, "API key is not set");
            return Err(PlanError::MissingApiKey {
                var: self.api_key_env.clone(),
            });
        }

        let messages = self.composer.plan_messages(&materials, goal, deadline, now);
        let response = self
            .brain
            .complete(messages, self.plan_temperature, self.plan_max_tokens)
            .await
            .map_err(|e| {
                error!(error = %e, "Error generating study plan");
                match e {
                    LlmError::MissingApiKey { var } => PlanError::MissingApiKey { var },
                    other => PlanError::Generation {
                        message: other.to_string(),
                    },
                }
            })?;

        Ok(parse_study_plan(&response.text))
    }

    /// Answer one chat message and record the turn in `history`.
    ///
    /// Never fails: model errors become a fallback reply, which is recorded
    /// like any other answer.
    pub async fn chat(&self, history: &mut ChatHistory, message: &str) -> String {
        let materials = self.materials().await;

        let reply = if materials.is_empty() {
            NO_MATERIALS_REPLY.to_string()
        } else if !self.brain.has_api_key() {
            warn!(env = %self.api_key_env, "API key is not set");
            MISSING_KEY_REPLY.to_string()
        } else {
            let messages = self
                .composer
                .chat_messages(&materials, history.messages(), message);
            match self
                .brain
                .complete(messages, self.chat_temperature, self.chat_max_tokens)
                .await
            {
                Ok(response) => response.text,
                Err(e) => {
                    error!(error = %e, "Error in chat response");
                    fallback_reply(&e).to_string()
                }
            }
        };

        history.record_turn(message, reply.clone());
        reply
    }
}
