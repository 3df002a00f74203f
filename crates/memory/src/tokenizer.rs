//! Token counting for prompt budgeting.

use neurorag_common::{RagError, Result};
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Counts tokens the way the prompt budget is measured.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// `cl100k_base` byte-pair encoding.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RagError::Config(format!("failed to load cl100k_base: {e}")))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Roughly four characters per token; at least one for non-empty text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        text.chars().count().div_ceil(4).max(1)
    }
}

/// The BPE counter, or the heuristic one if its tables cannot be loaded.
pub fn default_tokenizer() -> Box<dyn Tokenizer> {
    match TiktokenCounter::cl100k() {
        Ok(counter) => Box::new(counter),
        Err(e) => {
            warn!(error = %e, "Falling back to heuristic token counting");
            Box::new(HeuristicTokenizer)
        }
    }
}
