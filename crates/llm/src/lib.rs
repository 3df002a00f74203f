pub mod client;
pub mod config;
pub mod gemini;
pub mod generator;
pub mod openai;
pub mod retry;

pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
pub use config::{build_llm_client, LlmConfig, SemaphoredClient};
pub use gemini::GeminiClient;
pub use generator::{AnswerGenerator, GenerationConfig, DEFAULT_FALLBACK_MESSAGE};
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};
