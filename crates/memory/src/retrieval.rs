//! Prompt context assembly under a token budget.

use crate::tokenizer::Tokenizer;
use crate::types::RetrievedChunk;
use std::sync::Arc;
use tracing::debug;

/// Passages selected for the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    /// Included passages joined with `\n`
    pub text: String,
    pub tokens_used: usize,
    /// Number of leading ranked passages that made it in
    pub included: usize,
}

/// Selects the longest prefix of ranked passages that fits the budget.
pub struct ContextAssembler {
    tokenizer: Arc<dyn Tokenizer>,
    token_budget: usize,
}

impl ContextAssembler {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, token_budget: usize) -> Self {
        Self {
            tokenizer,
            token_budget,
        }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn assemble(&self, ranked: &[RetrievedChunk]) -> AssembledContext {
        self.assemble_with_budget(ranked.iter().map(|c| c.text.as_str()), self.token_budget)
    }

    /// Include passages in rank order while the running total stays within
    /// `budget`. The first passage that would overflow ends assembly; later
    /// passages are not considered even if they would fit.
    pub fn assemble_with_budget<'a, I>(&self, ranked: I, budget: usize) -> AssembledContext
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut parts: Vec<&str> = Vec::new();
        let mut tokens_used = 0;

        for passage in ranked {
            let tokens = self.tokenizer.count_tokens(passage);
            if tokens_used + tokens > budget {
                break;
            }
            parts.push(passage);
            tokens_used += tokens;
        }

        debug!(
            included = parts.len(),
            tokens_used,
            budget,
            "Assembled prompt context"
        );

        AssembledContext {
            text: parts.join("\n"),
            tokens_used,
            included: parts.len(),
        }
    }
}

/// Prompt sent to the generative model.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question based on the context below:\n\nContext:\n{context}\n\nQuestion: {question}\nAnswer:"
    )
}
