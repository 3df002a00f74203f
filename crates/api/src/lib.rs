//! HTTP API for the NeuroRAG retrieval service.
//!
//! # Endpoints
//!
//! - `GET /` - Health check
//! - `POST /upload` - Ingest a PDF (multipart field `file`)
//! - `POST /ask` - Retrieve passages for `{query}` and generate an answer
//! - `GET /stats` - Chunk, index and dump archive counts
//!
//! # Architecture
//!
//! ```text
//!   Client
//!     │
//!     ▼
//! ┌─────────────────┐     ┌───────────────────┐
//! │   API (Axum)    │────►│ DocumentExtractor │
//! └────────┬────────┘     └───────────────────┘
//!          │
//!          ├──────────────────┬────────────────────┐
//!          ▼                  ▼                    ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │  MemoryManager  │ │ContextAssembler │ │ AnswerGenerator │
//! │ (store + index) │ │ (token budget)  │ │  (LLM+fallback) │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```

pub mod config;
pub mod document;
pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::{AppConfig, ServerConfig};
pub use document::{DocumentExtractor, PdfExtractor};
pub use state::AppState;

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(routes::root))
        .route("/upload", post(routes::upload))
        .route("/ask", post(routes::ask))
        .route("/stats", get(routes::stats))
        // Middleware
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);

    info!(%addr, "Starting NeuroRAG API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}
