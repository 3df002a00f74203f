//! Document extraction boundary.
//!
//! Uploaded files are turned into a list of trimmed, non-empty passages
//! before they reach the memory manager.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use neurorag_common::{RagError, Result};
use tracing::debug;

/// Turns an uploaded file into passages.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// File extension this extractor handles, without the dot.
    fn extension(&self) -> &str;

    async fn extract(&self, path: &Path) -> Result<Vec<String>>;

    /// Whether `filename` has this extractor's extension (case-insensitive).
    fn accepts(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.extension()))
    }
}

/// PDF text extraction via `pdf-extract`.
#[derive(Debug, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    fn extension(&self) -> &str {
        "pdf"
    }

    async fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let path: PathBuf = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
            .await
            .map_err(|e| RagError::Extraction(format!("extraction task failed: {e}")))?
            .map_err(|e| RagError::Extraction(e.to_string()))?;

        let passages = split_passages(&text);
        debug!(chars = text.len(), passages = passages.len(), "Extracted PDF text");
        Ok(passages)
    }
}

/// One passage per line, trimmed, blank lines dropped.
pub fn split_passages(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
