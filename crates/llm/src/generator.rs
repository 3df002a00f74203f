//! Answer generation with a fixed fallback.
//!
//! [`AnswerGenerator::generate`] never fails: provider errors, timeouts and
//! empty completions are logged and replaced by the configured fallback text.

use std::sync::Arc;
use std::time::Duration;

use neurorag_common::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::client::{ChatMessage, LlmClient, LlmRequest};

pub const DEFAULT_FALLBACK_MESSAGE: &str = "I apologize, but I'm having trouble generating a response at the moment. Please try again in a few moments.";

/// Sampling parameters and failure policy for answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    /// Upper bound on a single provider call, retries included.
    pub timeout_ms: u64,
    pub fallback_message: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 2048,
            timeout_ms: 30_000,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

pub struct AnswerGenerator {
    client: Arc<dyn LlmClient>,
    config: GenerationConfig,
}

impl AnswerGenerator {
    pub fn new(client: Arc<dyn LlmClient>, config: GenerationConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    fn request(&self, prompt: &str) -> LlmRequest {
        LlmRequest {
            system_prompt: None,
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(self.config.temperature),
            top_p: Some(self.config.top_p),
            top_k: Some(self.config.top_k),
            max_tokens: Some(self.config.max_output_tokens),
        }
    }

    /// Run the completion, surfacing every failure as `RagError::Generation`.
    pub async fn try_generate(&self, prompt: &str) -> Result<String> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let response = tokio::time::timeout(timeout, self.client.complete(self.request(prompt)))
            .await
            .map_err(|_| {
                RagError::Generation(format!(
                    "model call timed out after {}ms",
                    self.config.timeout_ms
                ))
            })?
            .map_err(|e| match e {
                RagError::Generation(_) => e,
                other => RagError::Generation(other.to_string()),
            })?;

        if response.content.trim().is_empty() {
            return Err(RagError::Generation("model returned empty text".to_string()));
        }

        debug!(
            model = %response.model,
            prompt_tokens = response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens = response.usage.as_ref().map(|u| u.completion_tokens),
            "Generated answer"
        );
        Ok(response.content)
    }

    /// Generate an answer for `prompt`, or the fallback text on failure.
    pub async fn generate(&self, prompt: &str) -> String {
        match self.try_generate(prompt).await {
            Ok(text) => text,
            Err(e) => {
                error!(
                    error = %e,
                    model = self.client.model_name(),
                    "Answer generation failed, returning fallback"
                );
                self.config.fallback_message.clone()
            }
        }
    }
}
