use std::sync::Arc;

use async_trait::async_trait;
use neurorag_common::{RagError, Result};
use serde::{Deserialize, Serialize};

use crate::client::{LlmClient, LlmRequest, LlmResponse};
use crate::gemini::GeminiClient;
use crate::openai::OpenAiClient;
use crate::retry::{RetryConfig, RetryingClient};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_concurrent() -> usize {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            max_concurrent_requests: default_max_concurrent(),
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Environment variable holding the provider's API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "gemini" => Some("GEMINI_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }
}

pub struct SemaphoredClient {
    inner: Arc<dyn LlmClient>,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl SemaphoredClient {
    pub fn new(inner: Arc<dyn LlmClient>, max_concurrent: usize) -> Self {
        Self {
            inner,
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl LlmClient for SemaphoredClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| RagError::Generation(format!("Semaphore acquire failed: {e}")))?;
        self.inner.complete(request).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let base_client: Box<dyn LlmClient> = match config.provider.as_str() {
        "gemini" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                RagError::Config("Gemini requires an API key (set GEMINI_API_KEY)".to_string())
            })?;
            Box::new(GeminiClient::new(
                config.api_url.clone(),
                config.model.clone(),
                api_key,
            ))
        }
        "openai" => Box::new(OpenAiClient::new(
            config.api_url.clone(),
            config.model.clone(),
            config.api_key.clone(),
        )),
        other => {
            return Err(RagError::Config(format!("Unknown LLM provider: {other}")));
        }
    };

    let retrying: Box<dyn LlmClient> =
        Box::new(RetryingClient::new(base_client, config.retry.clone()));

    let semaphored = SemaphoredClient::new(Arc::from(retrying), config.max_concurrent_requests);

    Ok(Arc::new(semaphored))
}
