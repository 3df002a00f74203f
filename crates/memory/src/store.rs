//! Chunk storage with on-disk snapshots and an append-only dump archive.
//!
//! The store is the source of truth for every chunk: text, embedding and
//! metadata live together, keyed by identifier and kept in insertion order.
//! Three artifacts are written under the data directory:
//!
//! - `neuro_memory.json`: the full store snapshot
//! - `embeddings.bin`: the ordered `(id, vector)` snapshot used to warm the index
//! - `memory_dump.jsonl`: evicted chunks, one JSON object per line

use crate::types::{Chunk, ChunkMetadata, EvictedChunk};
use chrono::Utc;
use neurorag_common::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STORE_FILE: &str = "neuro_memory.json";
const VECTORS_FILE: &str = "embeddings.bin";
const DUMP_FILE: &str = "memory_dump.jsonl";

/// Locations of the persisted artifacts.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub store: PathBuf,
    pub vectors: PathBuf,
    pub dump: PathBuf,
}

impl StorePaths {
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            store: dir.join(STORE_FILE),
            vectors: dir.join(VECTORS_FILE),
            dump: dir.join(DUMP_FILE),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoreSnapshot {
    chunks: Vec<Chunk>,
}

#[derive(Serialize, Deserialize)]
struct VectorSnapshot {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

/// Ordered map of chunk id to chunk.
pub struct ChunkStore {
    paths: StorePaths,
    chunks: Vec<Chunk>,
    positions: HashMap<String, usize>,
    dump: DumpArchive,
}

impl ChunkStore {
    /// Load the store from `paths`, starting empty when no snapshot exists.
    pub fn load(paths: StorePaths) -> Result<Self> {
        let chunks = if paths.store.exists() {
            let content = fs::read_to_string(&paths.store)?;
            let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
            snapshot.chunks
        } else {
            debug!(path = %paths.store.display(), "No store snapshot, starting empty");
            Vec::new()
        };

        info!(
            path = %paths.store.display(),
            chunks = chunks.len(),
            "Loaded chunk store"
        );

        let dump = DumpArchive::new(paths.dump.clone());
        let mut store = Self {
            paths,
            chunks,
            positions: HashMap::new(),
            dump,
        };
        store.reindex_positions();
        Ok(store)
    }

    /// Open the store inside `data_dir`, creating the directory if needed.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(data_dir.as_ref())?;
        Self::load(StorePaths::in_dir(data_dir))
    }

    /// Create a chunk with a fresh identifier and default metadata.
    pub fn put(
        &mut self,
        text: impl Into<String>,
        embedding: Vec<f32>,
        source_label: &str,
    ) -> Result<String> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RagError::Validation("chunk text cannot be empty".into()));
        }
        if embedding.is_empty() {
            return Err(RagError::Validation("chunk embedding cannot be empty".into()));
        }
        if let Some(dim) = self.dimension() {
            if embedding.len() != dim {
                return Err(RagError::Validation(format!(
                    "embedding has {} dimensions, store holds {}-dim vectors",
                    embedding.len(),
                    dim
                )));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.positions.insert(id.clone(), self.chunks.len());
        self.chunks.push(Chunk {
            id: id.clone(),
            text,
            embedding,
            metadata: ChunkMetadata::new(source_label),
        });
        Ok(id)
    }

    /// All chunks in insertion order.
    pub fn get_all(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.positions.get(id).map(|&pos| &self.chunks[pos])
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Dimension of the stored embeddings, if any chunk exists.
    pub fn dimension(&self) -> Option<usize> {
        self.chunks.first().map(|c| c.embedding.len())
    }

    /// Apply `mutator` to the metadata of chunk `id`.
    pub fn update_metadata<F>(&mut self, id: &str, mutator: F) -> Result<&ChunkMetadata>
    where
        F: FnOnce(&mut ChunkMetadata),
    {
        let pos = *self
            .positions
            .get(id)
            .ok_or_else(|| RagError::NotFound(id.to_string()))?;
        mutator(&mut self.chunks[pos].metadata);
        Ok(&self.chunks[pos].metadata)
    }

    /// Apply `mutator` to the metadata of every chunk.
    pub fn update_all<F>(&mut self, mut mutator: F)
    where
        F: FnMut(&mut ChunkMetadata),
    {
        for chunk in &mut self.chunks {
            mutator(&mut chunk.metadata);
        }
    }

    /// Remove every chunk whose metadata satisfies `predicate`.
    ///
    /// Evicted chunks are appended to the dump archive before they leave
    /// the live store; if the append fails nothing is removed.
    pub fn evict<P>(&mut self, predicate: P) -> Result<Vec<String>>
    where
        P: Fn(&ChunkMetadata) -> bool,
    {
        let victims: Vec<&Chunk> = self
            .chunks
            .iter()
            .filter(|c| predicate(&c.metadata))
            .collect();
        if victims.is_empty() {
            return Ok(Vec::new());
        }

        self.dump.append(&victims)?;

        let evicted: Vec<String> = victims.iter().map(|c| c.id.clone()).collect();
        self.chunks.retain(|c| !predicate(&c.metadata));
        self.reindex_positions();

        info!(
            evicted = evicted.len(),
            remaining = self.chunks.len(),
            "Evicted chunks to dump archive"
        );
        Ok(evicted)
    }

    /// Ordered `(id, vector)` pairs for building the embedding index.
    pub fn vectors(&self) -> Vec<(String, Vec<f32>)> {
        self.chunks
            .iter()
            .map(|c| (c.id.clone(), c.embedding.clone()))
            .collect()
    }

    /// Persisted vector snapshot when it matches the store ordering,
    /// otherwise vectors rebuilt from the store itself.
    pub fn load_vectors(&self) -> Vec<(String, Vec<f32>)> {
        match self.read_vector_snapshot() {
            Ok(Some(snapshot)) if self.snapshot_matches(&snapshot) => {
                snapshot.ids.into_iter().zip(snapshot.vectors).collect()
            }
            Ok(Some(_)) => {
                warn!(
                    path = %self.paths.vectors.display(),
                    "Vector snapshot out of sync with store, rebuilding from store"
                );
                self.vectors()
            }
            Ok(None) => self.vectors(),
            Err(e) => {
                warn!(error = %e, "Failed to read vector snapshot, rebuilding from store");
                self.vectors()
            }
        }
    }

    fn read_vector_snapshot(&self) -> Result<Option<VectorSnapshot>> {
        if !self.paths.vectors.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.paths.vectors)?;
        let snapshot = bincode::deserialize(&bytes)
            .map_err(|e| RagError::Persistence(format!("corrupt vector snapshot: {e}")))?;
        Ok(Some(snapshot))
    }

    fn snapshot_matches(&self, snapshot: &VectorSnapshot) -> bool {
        snapshot.ids.len() == self.chunks.len()
            && snapshot.vectors.len() == self.chunks.len()
            && snapshot
                .ids
                .iter()
                .zip(&self.chunks)
                .all(|(id, chunk)| *id == chunk.id)
    }

    /// Write the store snapshot followed by the vector snapshot.
    ///
    /// The two artifacts are always regenerated together.
    pub fn save(&self) -> Result<()> {
        let snapshot = StoreSnapshot {
            chunks: self.chunks.clone(),
        };
        let json = serde_json::to_vec(&snapshot)?;
        write_atomic(&self.paths.store, &json)?;

        let (ids, vectors): (Vec<String>, Vec<Vec<f32>>) = self
            .chunks
            .iter()
            .map(|c| (c.id.clone(), c.embedding.clone()))
            .unzip();
        let bytes = bincode::serialize(&VectorSnapshot { ids, vectors })
            .map_err(|e| RagError::Persistence(format!("failed to encode vectors: {e}")))?;
        write_atomic(&self.paths.vectors, &bytes)?;

        debug!(chunks = self.chunks.len(), "Saved chunk store");
        Ok(())
    }

    pub fn dump(&self) -> &DumpArchive {
        &self.dump
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn reindex_positions(&mut self) {
        self.positions = self
            .chunks
            .iter()
            .enumerate()
            .map(|(pos, c)| (c.id.clone(), pos))
            .collect();
    }
}

/// Append-only archive of evicted chunks.
///
/// The live system only ever writes here; reading is for audit and recovery.
pub struct DumpArchive {
    path: PathBuf,
}

impl DumpArchive {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, chunks: &[&Chunk]) -> Result<()> {
        let evicted_at = Utc::now();
        let mut buf = Vec::new();
        for chunk in chunks {
            let record = EvictedChunk {
                chunk: (*chunk).clone(),
                evicted_at,
            };
            serde_json::to_writer(&mut buf, &record)?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| persistence("open dump archive", &self.path, e))?;
        file.write_all(&buf)
            .and_then(|_| file.sync_data())
            .map_err(|e| persistence("append to dump archive", &self.path, e))?;
        Ok(())
    }

    /// Read back every archived record.
    pub fn read_all(&self) -> Result<Vec<EvictedChunk>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Archive size on disk; zero before the first eviction.
    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.read_all()?.iter().any(|r| r.chunk.id == id))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| persistence("write", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| persistence("replace", path, e))?;
    Ok(())
}

fn persistence(action: &str, path: &Path, err: std::io::Error) -> RagError {
    RagError::Persistence(format!("failed to {action} '{}': {err}", path.display()))
}
