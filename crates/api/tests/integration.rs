//! Integration tests for the API layer.
//!
//! These tests spin up a real HTTP server on a random port with a keyword
//! embedder, a scripted LLM client and a plain-text extractor standing in
//! for the PDF parser.

use async_trait::async_trait;
use neurorag_api::document::split_passages;
use neurorag_api::{create_router, AppConfig, AppState, DocumentExtractor};
use neurorag_common::{RagError, Result};
use neurorag_llm::{
    AnswerGenerator, GenerationConfig, LlmClient, LlmRequest, LlmResponse,
    DEFAULT_FALLBACK_MESSAGE,
};
use neurorag_memory::{default_tokenizer, KeywordEmbedder, MemoryManager, Tokenizer};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const KEYWORDS: [&str; 6] = ["rust", "python", "memory", "search", "cooking", "music"];

/// Reads the upload as UTF-8 text; accepts `.pdf` names like the real extractor.
struct TextExtractor;

#[async_trait]
impl DocumentExtractor for TextExtractor {
    fn extension(&self) -> &str {
        "pdf"
    }

    async fn extract(&self, path: &Path) -> Result<Vec<String>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RagError::Extraction(e.to_string()))?;
        Ok(split_passages(&text))
    }
}

/// Answers with the prompt it was given.
struct EchoClient;

#[async_trait]
impl LlmClient for EchoClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        Ok(LlmResponse {
            content: format!("ECHO: {}", request.messages[0].content),
            model: "echo".to_string(),
            usage: None,
            finish_reason: None,
        })
    }
    fn model_name(&self) -> &str {
        "echo"
    }
}

struct FailingClient;

#[async_trait]
impl LlmClient for FailingClient {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
        Err(RagError::Generation("Gemini API error 503 Service Unavailable".to_string()))
    }
    fn model_name(&self) -> &str {
        "failing"
    }
}

struct TestServer {
    base: String,
    dir: TempDir,
}

impl TestServer {
    fn temp_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("temp")
    }

    fn data_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("data")
    }
}

/// Spin up a test server on a random port and return its base URL.
async fn start_test_server(client: Arc<dyn LlmClient>) -> TestServer {
    start_test_server_with(client, |_| {}).await
}

async fn start_test_server_with(
    client: Arc<dyn LlmClient>,
    configure: impl FnOnce(&mut AppConfig),
) -> TestServer {
    let dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.server.temp_dir = dir.path().join("temp");
    config.memory.data_dir = dir.path().join("data");
    config.memory.embedding_dim = KEYWORDS.len();
    configure(&mut config);

    let memory = MemoryManager::open(
        config.memory.clone(),
        Arc::new(KeywordEmbedder::new(KEYWORDS)),
    )
    .unwrap();
    let generator = AnswerGenerator::new(client, GenerationConfig::default());
    let state = Arc::new(AppState::new(
        config,
        Arc::new(memory),
        generator,
        Arc::new(TextExtractor),
    ));
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        dir,
    }
}

/// Helper to GET a URL and return (status, json body).
async fn get(base: &str, path: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .get(format!("{}{}", base, path))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// Helper to POST JSON and return (status, json body).
async fn post_json(base: &str, path: &str, json: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .json(&json)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// Helper to upload `content` as multipart field `file` named `filename`.
async fn upload(base: &str, filename: &str, content: &str) -> (u16, Value) {
    upload_bytes(base, filename, content.as_bytes().to_vec()).await
}

async fn upload_bytes(base: &str, filename: &str, content: Vec<u8>) -> (u16, Value) {
    let part = reqwest::multipart::Part::bytes(content).file_name(filename.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

const DOCUMENT: &str = "Rust guarantees memory safety without a garbage collector.\n\n\
                        Python is popular for scripting.\n   \n\
                        Cooking pasta needs salted water.\n";

// ============================================================================
// Health endpoint
// ============================================================================

#[tokio::test]
async fn test_root_endpoint() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    let (status, body) = get(&server.base, "/").await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Welcome to NeuroRAG API");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["chunks"], 0);
}

// ============================================================================
// Upload endpoint
// ============================================================================

#[tokio::test]
async fn test_upload_ingests_passages() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    let (status, body) = upload(&server.base, "notes.pdf", DOCUMENT).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["message"], "PDF processed and stored successfully.");
    assert_eq!(body["chunks_ingested"], 3);

    let (_, root) = get(&server.base, "/").await;
    assert_eq!(root["chunks"], 3);

    // The temporary upload file is gone
    let leftovers = std::fs::read_dir(server.temp_dir()).unwrap().count();
    assert_eq!(leftovers, 0);

    // And the store was persisted
    assert!(server.data_dir().join("neuro_memory.json").exists());
}

#[tokio::test]
async fn test_upload_accepts_uppercase_extension() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    let (status, _) = upload(&server.base, "NOTES.PDF", DOCUMENT).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_upload_rejects_non_pdf() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    let (status, body) = upload(&server.base, "notes.txt", DOCUMENT).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Only PDF files are allowed");
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (_, root) = get(&server.base, "/").await;
    assert_eq!(root["chunks"], 0);
    assert!(!server.temp_dir().exists());
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    let form = reqwest::multipart::Form::new().text("comment", "no file here");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No file provided");
}

#[tokio::test]
async fn test_upload_extraction_failure_is_500() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    let (status, body) = upload_bytes(&server.base, "broken.pdf", vec![0xff, 0xfe, 0x00, 0x9f]).await;
    assert_eq!(status, 500, "{body}");
    assert_eq!(body["code"], "EXTRACTION_ERROR");

    let (_, root) = get(&server.base, "/").await;
    assert_eq!(root["chunks"], 0);
    let leftovers = std::fs::read_dir(server.temp_dir()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_upload_persistence_failure_is_500_but_queryable() {
    let server = start_test_server(Arc::new(EchoClient)).await;

    // Replace the data directory with a plain file so snapshots cannot be written.
    std::fs::remove_dir_all(server.data_dir()).unwrap();
    std::fs::write(server.data_dir(), b"not a directory").unwrap();

    let (status, body) = upload(&server.base, "notes.pdf", DOCUMENT).await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], "PERSISTENCE_ERROR");

    let (status, body) = post_json(&server.base, "/ask", serde_json::json!({"query": "rust"})).await;
    assert_eq!(status, 200);
    assert!(!body["answers"].as_array().unwrap().is_empty());
}

// ============================================================================
// Ask endpoint
// ============================================================================

#[tokio::test]
async fn test_ask_empty_query() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    upload(&server.base, "notes.pdf", DOCUMENT).await;

    for query in ["", "   ", "\n\t"] {
        let (status, body) =
            post_json(&server.base, "/ask", serde_json::json!({ "query": query })).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Query cannot be empty");
    }
}

#[tokio::test]
async fn test_ask_before_any_upload() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    let (status, body) =
        post_json(&server.base, "/ask", serde_json::json!({"query": "rust"})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "No documents have been uploaded yet");
    assert_eq!(body["code"], "EMPTY_CORPUS");
}

#[tokio::test]
async fn test_ask_returns_ranked_answers_and_generation() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    upload(&server.base, "notes.pdf", DOCUMENT).await;

    let (status, body) =
        post_json(&server.base, "/ask", serde_json::json!({"query": "Why is rust memory safe?"}))
            .await;
    assert_eq!(status, 200, "{body}");

    let answers = body["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 3);
    assert!(answers[0]["text"].as_str().unwrap().starts_with("Rust guarantees"));
    assert_eq!(answers[0]["metadata"]["source"], "notes.pdf");
    assert_eq!(answers[0]["metadata"]["frequency"], 2);
    assert_eq!(answers[0]["metadata"]["recency"], 1.0);
    assert!(answers[0]["id"].as_str().is_some());

    let llm_response = body["llm_response"].as_str().unwrap();
    assert!(llm_response.starts_with("ECHO: Answer the question based on the context below:"));
    assert!(llm_response.contains("Rust guarantees memory safety"));
    assert!(llm_response.contains("Question: Why is rust memory safe?"));
    assert!(body["context_tokens"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_ask_context_stops_at_first_overflowing_passage() {
    let closest = "Rust guarantees memory safety without a garbage collector.";
    let middle = "Python memory management relies on reference counting plus a cycle \
                  detecting garbage collector that runs periodically in the background.";
    let farthest = "Cooking pasta.";

    let tokenizer = default_tokenizer();
    let closest_tokens = tokenizer.count_tokens(closest);
    let farthest_tokens = tokenizer.count_tokens(farthest);
    assert!(farthest_tokens < tokenizer.count_tokens(middle));

    // Room for the closest and farthest passages, not the middle one.
    let server = start_test_server_with(Arc::new(EchoClient), |config| {
        config.memory.context_token_budget = closest_tokens + farthest_tokens;
    })
    .await;
    let document = format!("{closest}\n{middle}\n{farthest}\n");
    upload(&server.base, "notes.pdf", &document).await;

    let (status, body) =
        post_json(&server.base, "/ask", serde_json::json!({"query": "rust memory"})).await;
    assert_eq!(status, 200, "{body}");

    let answers: Vec<&str> = body["answers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["text"].as_str().unwrap())
        .collect();
    assert_eq!(answers, vec![closest, middle, farthest]);
    assert_eq!(body["context_tokens"].as_u64().unwrap() as usize, closest_tokens);

    let llm_response = body["llm_response"].as_str().unwrap();
    assert!(llm_response.contains(closest));
    assert!(!llm_response.contains("reference counting"));
    assert!(!llm_response.contains(farthest));
}

#[tokio::test]
async fn test_ask_with_failing_llm_returns_fallback() {
    let server = start_test_server(Arc::new(FailingClient)).await;
    upload(&server.base, "notes.pdf", DOCUMENT).await;

    let (status, body) =
        post_json(&server.base, "/ask", serde_json::json!({"query": "rust"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["llm_response"], DEFAULT_FALLBACK_MESSAGE);
    assert_eq!(body["answers"].as_array().unwrap().len(), 3);
}

// ============================================================================
// Stats endpoint
// ============================================================================

#[tokio::test]
async fn test_stats_endpoint() {
    let server = start_test_server(Arc::new(EchoClient)).await;
    upload(&server.base, "notes.pdf", DOCUMENT).await;

    let (status, body) = get(&server.base, "/stats").await;
    assert_eq!(status, 200);
    assert_eq!(body["total_chunks"], 3);
    assert_eq!(body["index_size"], 3);
    assert_eq!(body["evicted_since_start"], 0);
    assert_eq!(body["archive_bytes"], 0);
    assert_eq!(body["embedding_model"], "keyword");
    assert_eq!(body["llm_model"], "echo");
}
