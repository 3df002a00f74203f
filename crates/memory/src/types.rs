//! Chunk types and memory configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Recency assigned to a chunk at creation and on every retrieval.
pub const MAX_RECENCY: f32 = 1.0;

/// Usage-derived metadata tracked per chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Creation time, never modified afterwards
    pub uploaded_at: DateTime<Utc>,

    /// Number of times the chunk has been returned by a query, starting at 1
    pub frequency: u64,

    /// Usage freshness in `[0.0, 1.0]`; the only signal consulted for eviction
    pub recency: f32,

    /// Label of the document the chunk was extracted from
    pub source: String,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            uploaded_at: Utc::now(),
            frequency: 1,
            recency: MAX_RECENCY,
            source: source.into(),
        }
    }

    /// Record a retrieval hit.
    pub fn touch(&mut self) {
        self.frequency += 1;
        self.recency = MAX_RECENCY;
    }

    /// Multiply recency by `factor`, keeping it inside `[0.0, 1.0]`.
    pub fn decay(&mut self, factor: f32) {
        self.recency = (self.recency * factor).clamp(0.0, MAX_RECENCY);
    }
}

/// A retrievable passage together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque identifier, generated at ingestion and never reused
    pub id: String,

    /// Passage text (never empty)
    pub text: String,

    /// Embedding vector
    pub embedding: Vec<f32>,

    pub metadata: ChunkMetadata,
}

/// A chunk returned by a query, as seen after its metadata update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Euclidean distance between the query and the chunk embedding
    pub distance: f32,
}

/// A chunk moved out of the live store into the dump archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictedChunk {
    pub chunk: Chunk,
    pub evicted_at: DateTime<Utc>,
}

/// Configuration for the memory subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding the store snapshot, vector snapshot and dump archive
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    /// Neighbors returned per query
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Chunks whose recency falls below this value are evicted
    #[serde(default = "default_eviction_threshold")]
    pub eviction_threshold: f32,

    /// Multiplicative recency decay applied to every chunk once per query
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f32,

    /// Token budget for the assembled prompt context
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".into()
}

fn default_embedding_dim() -> usize {
    384 // MiniLM dimension
}

fn default_top_k() -> usize {
    5
}

fn default_eviction_threshold() -> f32 {
    0.2
}

fn default_recency_decay() -> f32 {
    0.95
}

fn default_context_token_budget() -> usize {
    1500
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            default_top_k: default_top_k(),
            eviction_threshold: default_eviction_threshold(),
            recency_decay: default_recency_decay(),
            context_token_budget: default_context_token_budget(),
        }
    }
}
