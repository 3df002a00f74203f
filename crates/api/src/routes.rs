//! HTTP route handlers for the API.

use crate::AppState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use neurorag_common::RagError;
use neurorag_memory::{build_prompt, ChunkMetadata};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "PDF processed and stored successfully.";

/// Root health response.
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub version: &'static str,
    pub chunks: usize,
}

/// Health check endpoint.
pub async fn root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Welcome to NeuroRAG API",
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        chunks: state.memory.len().await,
    })
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip)]
    pub status: StatusCode,
}

impl From<RagError> for ErrorResponse {
    fn from(err: RagError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let error = match &err {
            RagError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self {
            error,
            code: err.code(),
            status,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Upload response body.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub chunks_ingested: usize,
}

/// Accept a PDF in the multipart field `file`, extract passages and ingest them.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ErrorResponse> {
    let (filename, bytes) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| RagError::Validation(format!("Invalid multipart body: {e}")))?
            .ok_or_else(|| RagError::Validation("No file provided".to_string()))?;

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !state.extractor.accepts(&filename) {
            return Err(RagError::Validation("Only PDF files are allowed".to_string()).into());
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| RagError::Validation(format!("Failed to read upload: {e}")))?;
        break (filename, bytes);
    };

    info!(filename = %filename, bytes = bytes.len(), "Received upload");

    // Removed on drop, on every exit path below.
    let temp_dir = &state.config.server.temp_dir;
    tokio::fs::create_dir_all(temp_dir).await.map_err(RagError::from)?;
    let temp_file = tempfile::Builder::new()
        .prefix("upload_")
        .suffix(&format!(".{}", state.extractor.extension()))
        .tempfile_in(temp_dir)
        .map_err(RagError::from)?;
    tokio::fs::write(temp_file.path(), &bytes)
        .await
        .map_err(RagError::from)?;

    let passages = state.extractor.extract(temp_file.path()).await?;
    let report = state.memory.ingest(&passages, &filename).await?;

    if let Some(err) = report.persist_error {
        error!(filename = %filename, error = %err, "Upload ingested but not persisted");
        return Err(err.into());
    }

    Ok(Json(UploadResponse {
        message: UPLOAD_SUCCESS_MESSAGE,
        chunks_ingested: report.ingested,
    }))
}

/// Question request body.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub query: String,
}

/// One retrieved passage, closest first.
#[derive(Debug, Serialize)]
pub struct Answer {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answers: Vec<Answer>,
    pub llm_response: String,
    pub context_tokens: usize,
}

/// Retrieve passages for a question and generate an answer from them.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ErrorResponse> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(RagError::Validation("Query cannot be empty".to_string()).into());
    }

    let retrieval = state.memory.retrieve(query, None).await?;
    if let Some(ref err) = retrieval.persist_error {
        warn!(error = %err, "Retrieval metadata not persisted");
    }
    if !retrieval.evicted.is_empty() {
        info!(evicted = retrieval.evicted.len(), "Evicted stale chunks");
    }

    let context = state.assembler.assemble(&retrieval.chunks);
    debug!(
        retrieved = retrieval.chunks.len(),
        included = context.included,
        tokens = context.tokens_used,
        "Built prompt context"
    );

    let prompt = build_prompt(&context.text, query);
    let llm_response = state.generator.generate(&prompt).await;

    Ok(Json(AskResponse {
        answers: retrieval
            .chunks
            .into_iter()
            .map(|c| Answer {
                id: c.id,
                text: c.text,
                metadata: c.metadata,
            })
            .collect(),
        llm_response,
        context_tokens: context.tokens_used,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_chunks: usize,
    pub index_size: usize,
    pub evicted_since_start: usize,
    pub archive_bytes: u64,
    pub embedding_model: String,
    pub llm_model: String,
    pub uptime_seconds: u64,
}

/// Memory statistics.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let status = state.memory.status().await;

    Json(StatsResponse {
        total_chunks: status.total_chunks,
        index_size: status.index_size,
        evicted_since_start: status.evicted_since_start,
        archive_bytes: status.archive_bytes,
        embedding_model: status.embedding_model,
        llm_model: state.generator.model_name().to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_response_serialization() {
        let response = RootResponse {
            message: "Welcome to NeuroRAG API",
            status: "healthy",
            version: "0.1.0",
            chunks: 3,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["message"], "Welcome to NeuroRAG API");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["chunks"], 3);
    }

    #[test]
    fn test_ask_request_deserialization() {
        let request: AskRequest = serde_json::from_str(r#"{"query": "What is RAG?"}"#).unwrap();
        assert_eq!(request.query, "What is RAG?");

        let missing: AskRequest = serde_json::from_str("{}").unwrap();
        assert!(missing.query.is_empty());
    }

    #[test]
    fn test_client_errors_map_to_400() {
        let response = ErrorResponse::from(RagError::Validation("Query cannot be empty".into()));
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error, "Query cannot be empty");
        assert_eq!(response.code, "VALIDATION_ERROR");

        let response = ErrorResponse::from(RagError::EmptyCorpus);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error, "No documents have been uploaded yet");
    }

    #[test]
    fn test_server_errors_map_to_500() {
        let response = ErrorResponse::from(RagError::Persistence("disk full".into()));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.code, "PERSISTENCE_ERROR");

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("status").is_none());
        assert!(json["error"].as_str().unwrap().contains("disk full"));

        let response = ErrorResponse::from(RagError::Extraction("corrupt xref table".into()));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.code, "EXTRACTION_ERROR");
    }
}
