//! OpenAI-compatible chat-completions client (OpenAI, Ollama, vLLM, ...).

use async_trait::async_trait;
use neurorag_common::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
use crate::retry::retry_after_header;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, model: String, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    /// `top_k` has no chat-completions equivalent and is not sent.
    fn build_body<'a>(&'a self, request: &LlmRequest) -> ChatCompletionBody<'a> {
        let system = request.system_prompt.iter().map(|s| ChatMessage {
            role: Role::System,
            content: s.clone(),
        });
        ChatCompletionBody {
            model: &self.model,
            messages: system.chain(request.messages.iter().cloned()).collect(),
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
        }
    }

    fn parse_completion(&self, completion: ChatCompletion) -> Result<LlmResponse> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Generation("No choices in completion".to_string()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            usage: completion.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            finish_reason: choice.finish_reason,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, url = %url, "Sending chat completion");

        let mut http_req = self.http_client.post(&url).json(&self.build_body(&request));
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| {
                RagError::Generation(format!("OpenAI request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = retry_after_header(response.headers());
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream {
                provider: "OpenAI",
                status: status.as_u16(),
                message: body_text.trim().to_string(),
                retry_after_ms,
            });
        }

        let completion: ChatCompletion = response.json().await.map_err(|e| {
            RagError::Generation(format!(
                "Failed to parse OpenAI response: {}",
                e.without_url()
            ))
        })?;

        self.parse_completion(completion)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
