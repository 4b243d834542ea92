//! PDF text extraction backed by the `pdf-extract` crate.

use std::path::Path;

use crate::error::ExtractError;

/// Extracts the text of every page, each page followed by a blank line.
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    pub async fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = tokio::fs::read(path).await?;
        run_blocking(move || Self::extract_from_mem(&bytes)).await
    }

    pub fn extract_from_mem(bytes: &[u8]) -> Result<String, ExtractError> {
        let pages =
            pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf {
                message: e.to_string(),
            })?;
        Ok(join_pages(&pages))
    }
}

/// Run CPU-bound extraction off the async workers. A panic inside the
/// parser becomes an extraction error; this relies on the unwinding panic
/// strategy.
async fn run_blocking<F>(extract: F) -> Result<String, ExtractError>
where
    F: FnOnce() -> Result<String, ExtractError> + Send + 'static,
{
    tokio::task::spawn_blocking(extract)
        .await
        .map_err(|e| ExtractError::Pdf {
            message: format!("extraction task failed: {e}"),
        })?
}

fn join_pages(pages: &[String]) -> String {
    let mut joined = String::with_capacity(pages.iter().map(|p| p.len() + 2).sum());
    for page in pages {
        joined.push_str(page);
        joined.push_str("\n\n");
    }
    joined
}
