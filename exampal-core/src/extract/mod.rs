//! # Text extraction
//!
//! Turns stored material files into plain text. Every failure is contained
//! here: callers receive an [`Extraction`] value, never an error.

mod ocr;
mod pdf;

pub use ocr::{MockOcrProvider, OcrProvider, VisionOcrProvider};
pub use pdf::PdfExtractor;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

use crate::types::MaterialKind;

/// Placeholder rendered for file types with no extractor.
pub const UNSUPPORTED_PLACEHOLDER: &str = "[Unsupported file type]";

/// Outcome of extracting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Text(String),
    Failed { reason: String },
    Unsupported,
}

impl Extraction {
    /// Prompt-ready text, with bracketed placeholders for failures.
    pub fn render(&self) -> String {
        match self {
            Extraction::Text(text) => text.clone(),
            Extraction::Failed { reason } => format!("[Error extracting text: {reason}]"),
            Extraction::Unsupported => UNSUPPORTED_PLACEHOLDER.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, Extraction::Text(_))
    }
}

impl Serialize for Extraction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render())
    }
}

/// Extracts text from a stored file of a known kind.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path, kind: MaterialKind) -> Extraction;
}

/// Dispatches PDFs to the PDF extractor and images to an OCR provider.
pub struct FileExtractor {
    pdf: PdfExtractor,
    ocr: Option<Arc<dyn OcrProvider>>,
}

impl FileExtractor {
    pub fn new(pdf: PdfExtractor, ocr: Option<Arc<dyn OcrProvider>>) -> Self {
        Self { pdf, ocr }
    }
}

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract(&self, path: &Path, kind: MaterialKind) -> Extraction {
        let result = match kind {
            MaterialKind::Pdf => self.pdf.extract(path).await,
            MaterialKind::Image => match &self.ocr {
                Some(ocr) => ocr.extract_text(path).await,
                None => Err(crate::error::ExtractError::OcrDisabled),
            },
            MaterialKind::Unknown => return Extraction::Unsupported,
        };

        match result {
            Ok(text) => {
                debug!(path = %path.display(), %kind, chars = text.chars().count(), "Extracted text");
                Extraction::Text(text)
            }
            Err(e) => {
                error!(path = %path.display(), %kind, error = %e, "Error extracting text");
                Extraction::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
