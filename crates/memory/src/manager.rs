//! Memory manager: orchestrates ingestion, retrieval and eviction.
use std::sync::Arc;

use neurorag_common::{RagError, Result};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    embedding::EmbeddingProvider,
    index::{FlatIndex, VectorIndex},
    store::ChunkStore,
    types::{Chunk, MemoryConfig, RetrievedChunk},
};

/// Store and index, guarded together so positions returned by the index
/// always refer to the store state they were computed against.
struct MemoryState {
    store: ChunkStore,
    index: Box<dyn VectorIndex>,
    /// Chunks evicted since this manager was opened
    evicted_total: usize,
}

impl MemoryState {
    fn reindex(&mut self) {
        self.index.rebuild(self.store.vectors());
    }
}

pub struct MemoryManager {
    config: MemoryConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    state: Mutex<MemoryState>,
}

/// Outcome of an ingestion batch.
#[derive(Debug)]
pub struct IngestReport {
    pub ingested: usize,
    /// Empty chunks filtered out before embedding
    pub skipped: usize,
    /// Set when the batch is queryable in memory but could not be saved
    pub persist_error: Option<RagError>,
}

/// Outcome of a retrieval cycle.
#[derive(Debug)]
pub struct Retrieval {
    /// Retrieved chunks, closest first, with their updated metadata
    pub chunks: Vec<RetrievedChunk>,
    /// Ids moved to the dump archive during this cycle
    pub evicted: Vec<String>,
    pub persist_error: Option<RagError>,
}

/// Status info about the memory system.
#[derive(Debug, Clone)]
pub struct MemoryStatus {
    pub total_chunks: usize,
    pub index_size: usize,
    pub evicted_since_start: usize,
    /// Size of the dump archive file
    pub archive_bytes: u64,
    pub embedding_model: String,
}

impl MemoryManager {
    /// Load the store from `config.data_dir` and index its vectors.
    pub fn open(config: MemoryConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Self::open_with_index(config, embedder, Box::new(FlatIndex::new()))
    }

    pub fn open_with_index(
        config: MemoryConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        mut index: Box<dyn VectorIndex>,
    ) -> Result<Self> {
        let store = ChunkStore::open(&config.data_dir)?;

        if let Some(dim) = store.dimension() {
            if dim != embedder.dimensions() {
                return Err(RagError::Config(format!(
                    "stored chunks have {}-dim embeddings but model '{}' produces {}",
                    dim,
                    embedder.model_name(),
                    embedder.dimensions()
                )));
            }
        }

        index.rebuild(store.load_vectors());
        info!(
            data_dir = %config.data_dir.display(),
            chunks = store.len(),
            model = embedder.model_name(),
            "Memory manager ready"
        );

        Ok(Self {
            config,
            embedder,
            state: Mutex::new(MemoryState {
                store,
                index,
                evicted_total: 0,
            }),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Embed and store a batch of passages, then rebuild the index and persist.
    ///
    /// Empty passages are skipped. A persistence failure is reported in the
    /// returned report; the chunks stay queryable for the process lifetime.
    pub async fn ingest(&self, raw_chunks: &[String], source_label: &str) -> Result<IngestReport> {
        let texts: Vec<String> = raw_chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        let skipped = raw_chunks.len() - texts.len();

        if texts.is_empty() {
            debug!(source = source_label, skipped, "Nothing to ingest");
            return Ok(IngestReport {
                ingested: 0,
                skipped,
                persist_error: None,
            });
        }

        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        let mut state = self.state.lock().await;
        let mut put_error = None;
        for (text, embedding) in texts.into_iter().zip(embeddings) {
            if let Err(e) = state.store.put(text, embedding, source_label) {
                put_error = Some(e);
                break;
            }
        }
        // Chunks stored before a failure stay; the index must cover them.
        state.reindex();
        if let Some(e) = put_error {
            warn!(error = %e, source = source_label, "Ingestion stopped part-way");
            return Err(e);
        }
        let ingested = raw_chunks.len() - skipped;

        let persist_error = state.store.save().err();
        if let Some(ref e) = persist_error {
            error!(error = %e, source = source_label, "Failed to persist ingested chunks");
        }

        info!(
            source = source_label,
            ingested,
            skipped,
            total = state.store.len(),
            "Ingested document"
        );

        Ok(IngestReport {
            ingested,
            skipped,
            persist_error,
        })
    }

    /// Retrieve the `k` closest chunks to `query` (config default when `None`).
    ///
    /// The whole cycle (embed, search, metadata update, persist, evict,
    /// reindex) runs under the store lock.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Retrieval> {
        let k = k.unwrap_or(self.config.default_top_k).max(1);
        let mut state = self.state.lock().await;

        if state.store.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        if query.trim().is_empty() {
            return Err(RagError::Validation("Query cannot be empty".into()));
        }

        let embedding = self.embedder.embed(query).await?;
        self.check_dimension(&embedding)?;
        let neighbors = state.index.query(&embedding, k)?;

        let decay = self.config.recency_decay;
        state.store.update_all(|m| m.decay(decay));

        let mut chunks = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let metadata = state
                .store
                .update_metadata(&neighbor.chunk_id, |m| m.touch())?
                .clone();
            let text = state
                .store
                .get(&neighbor.chunk_id)
                .map(|c| c.text.clone())
                .ok_or_else(|| RagError::NotFound(neighbor.chunk_id.clone()))?;
            chunks.push(RetrievedChunk {
                id: neighbor.chunk_id,
                text,
                metadata,
                distance: neighbor.distance,
            });
        }

        let mut persist_error = state.store.save().err();
        if let Some(ref e) = persist_error {
            error!(error = %e, "Failed to persist retrieval metadata");
        }

        let threshold = self.config.eviction_threshold;
        let evicted = match state.store.evict(|m| m.recency < threshold) {
            Ok(evicted) => evicted,
            Err(e) => {
                error!(error = %e, "Eviction failed, store left unchanged");
                persist_error.get_or_insert(e);
                Vec::new()
            }
        };

        if !evicted.is_empty() {
            state.evicted_total += evicted.len();
            if let Err(e) = state.store.save() {
                error!(error = %e, "Failed to persist store after eviction");
                persist_error.get_or_insert(e);
            }
            state.reindex();
            debug!(
                evicted = evicted.len(),
                index_size = state.index.len(),
                "Reindexed after eviction"
            );
        }

        debug!(query_len = query.len(), hits = chunks.len(), "Retrieval complete");

        Ok(Retrieval {
            chunks,
            evicted,
            persist_error,
        })
    }

    /// Persist the current store and vector snapshots.
    pub async fn save(&self) -> Result<()> {
        self.state.lock().await.store.save()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.store.is_empty()
    }

    /// Get status information about the memory system.
    pub async fn status(&self) -> MemoryStatus {
        let state = self.state.lock().await;
        MemoryStatus {
            total_chunks: state.store.len(),
            index_size: state.index.len(),
            evicted_since_start: state.evicted_total,
            archive_bytes: state.store.dump().size_bytes(),
            embedding_model: self.embedder.model_name().to_string(),
        }
    }

    /// Snapshot of a stored chunk's text and metadata.
    pub async fn get_chunk(&self, id: &str) -> Option<Chunk> {
        self.state.lock().await.store.get(id).cloned()
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            warn!(got = embedding.len(), expected, "Embedding dimension mismatch");
            return Err(RagError::Embedding(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.embedder.model_name(),
                embedding.len(),
                expected
            )));
        }
        Ok(())
    }
}
