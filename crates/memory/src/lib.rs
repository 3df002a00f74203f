//! Retrieval memory for NeuroRAG.
//!
//! Passages extracted from uploaded documents are embedded and kept in a
//! [`ChunkStore`] together with usage metadata (frequency, recency). A
//! [`VectorIndex`] built over the stored vectors answers nearest-neighbor
//! queries; every query refreshes the metadata of the chunks it returns,
//! decays everything else, and evicts stale chunks into an append-only
//! dump archive.
//!
//! # Architecture
//!
//! ```text
//!   ingest(passages)                       retrieve(question)
//!         │                                       │
//!         ▼                                       ▼
//! ┌─────────────────┐                   ┌─────────────────┐
//! │ EmbeddingProvider│                  │ EmbeddingProvider│
//! └────────┬────────┘                   └────────┬────────┘
//!          │            ┌──────────────┐         │
//!          └──────────► │ MemoryManager│ ◄───────┘
//!                       │  (one lock)  │
//!                       └──────┬───────┘
//!              ┌───────────────┼────────────────┐
//!              ▼               ▼                ▼
//!       ┌────────────┐  ┌─────────────┐  ┌─────────────┐
//!       │ ChunkStore │  │ VectorIndex │  │ DumpArchive │
//!       │ (snapshot) │  │ (FlatIndex) │  │  (jsonl)    │
//!       └────────────┘  └─────────────┘  └─────────────┘
//! ```
//!
//! Retrieved chunks are then fed to the [`ContextAssembler`], which keeps
//! the longest rank-ordered prefix that fits the prompt token budget.

pub mod embedding;
pub mod index;
pub mod manager;
pub mod retrieval;
pub mod store;
pub mod tokenizer;
pub mod types;

pub use embedding::{EmbeddingProvider, EmbeddingService, KeywordEmbedder};
pub use index::{FlatIndex, Neighbor, VectorIndex};
pub use manager::{IngestReport, MemoryManager, MemoryStatus, Retrieval};
pub use retrieval::{build_prompt, AssembledContext, ContextAssembler};
pub use store::{ChunkStore, DumpArchive, StorePaths};
pub use tokenizer::{default_tokenizer, HeuristicTokenizer, TiktokenCounter, Tokenizer};
pub use types::{Chunk, ChunkMetadata, EvictedChunk, MemoryConfig, RetrievedChunk};
