//! Error types for NeuroRAG.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Chunk not found: {0}")]
    NotFound(String),

    #[error("Embedding index is empty")]
    EmptyIndex,

    #[error("No documents have been uploaded yet")]
    EmptyCorpus,

    #[error("Generation error: {0}")]
    Generation(String),

    /// Non-success HTTP response from a model provider.
    #[error("{provider} API error {status}: {message}")]
    Upstream {
        provider: &'static str,
        status: u16,
        message: String,
        /// Server-requested backoff, from `Retry-After` or the response body
        retry_after_ms: Option<u64>,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Error processing document: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the failure was caused by the caller's input or by the
    /// corpus being empty, as opposed to an internal fault.
    ///
    /// A document that cannot be parsed is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::EmptyIndex | Self::EmptyCorpus
        )
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::EmptyIndex => "EMPTY_INDEX",
            Self::EmptyCorpus => "EMPTY_CORPUS",
            Self::Generation(_) => "GENERATION_ERROR",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Extraction(_) => "EXTRACTION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
