use async_trait::async_trait;
use neurorag_common::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
use crate::retry::retry_after_header;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Content-filter categories the service disables.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfigBody,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    model_version: Option<String>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<GeminiErrorInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiErrorInfo {
    #[serde(rename = "@type", default)]
    kind: String,
    retry_delay: Option<String>,
}

/// Build an `Upstream` error from a non-success response.
///
/// The body's `RetryInfo.retryDelay` (e.g. `"7s"`, `"0.5s"`) is preferred
/// over the `Retry-After` header.
fn upstream_error(status: u16, header_delay: Option<u64>, body: &str) -> RagError {
    let parsed = serde_json::from_str::<GeminiErrorBody>(body).ok();
    let body_delay = parsed.as_ref().and_then(|b| {
        b.error
            .details
            .iter()
            .filter(|d| d.kind.ends_with("RetryInfo"))
            .find_map(|d| d.retry_delay.as_deref().and_then(parse_duration_ms))
    });
    let message = match parsed {
        Some(b) if !b.error.message.is_empty() => b.error.message,
        _ => body.trim().to_string(),
    };

    RagError::Upstream {
        provider: "Gemini",
        status,
        message,
        retry_after_ms: body_delay.or(header_delay),
    }
}

/// Protobuf JSON duration (`"7s"`, `"1.500s"`) in milliseconds.
fn parse_duration_ms(value: &str) -> Option<u64> {
    let secs: f64 = value.trim().strip_suffix('s')?.parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| (secs * 1000.0).round() as u64)
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(base_url: Option<String>, model: String, api_key: String) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request_body(request: &LlmRequest) -> GeminiRequest {
        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let system_instruction = request.system_prompt.as_ref().map(|s| GeminiContent {
            role: None,
            parts: vec![GeminiPart { text: s.clone() }],
        });

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfigBody {
                temperature: request.temperature,
                top_p: request.top_p,
                top_k: request.top_k,
                max_output_tokens: request.max_tokens,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }

    fn parse_response(&self, response: GeminiResponse) -> Result<LlmResponse> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(RagError::Generation(format!(
                "Gemini blocked the prompt: {reason}"
            )));
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Generation("No candidates in Gemini response".to_string()))?;

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(RagError::Generation(format!(
                "Gemini returned an empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(LlmResponse {
            content,
            model: response
                .model_version
                .unwrap_or_else(|| self.model.clone()),
            usage: response.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            }),
            finish_reason: candidate.finish_reason,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = Self::build_request_body(&request);
        debug!(model = %self.model, "Sending Gemini request");

        let response = self
            .http_client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::Generation(format!("Gemini request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let header_delay = retry_after_header(response.headers());
            let body_text = response.text().await.unwrap_or_default();
            return Err(upstream_error(status.as_u16(), header_delay, &body_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            RagError::Generation(format!(
                "Failed to parse Gemini response: {}",
                e.without_url()
            ))
        })?;

        self.parse_response(gemini_response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
