//! Embedding generation for vector search.
//!
//! [`EmbeddingService`] runs a local fastembed model (all-MiniLM-L6-v2 by
//! default, 384 dimensions). [`KeywordEmbedder`] is a deterministic
//! bag-of-keywords embedder that needs no model download.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use neurorag_common::{RagError, Result};
use once_cell::sync::OnceCell;
use tokio::task;
use tracing::{debug, info, instrument};

/// Text → fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Embedding service backed by fastembed.
///
/// The model is initialized on first use and shared across all calls.
pub struct EmbeddingService {
    model_name: EmbeddingModel,
    model_label: String,
    dimension: usize,
    /// Lazily initialized text embedding model
    model: OnceCell<Arc<TextEmbedding>>,
}

impl EmbeddingService {
    /// Creates a new embedding service with the specified model.
    ///
    /// The model is not loaded until the first embedding call.
    pub fn new(model_name: EmbeddingModel) -> Self {
        let dimension = match model_name {
            EmbeddingModel::AllMiniLML6V2 | EmbeddingModel::AllMiniLML6V2Q => 384,
            EmbeddingModel::AllMiniLML12V2 | EmbeddingModel::AllMiniLML12V2Q => 384,
            EmbeddingModel::BGESmallENV15 | EmbeddingModel::BGESmallENV15Q => 384,
            EmbeddingModel::BGEBaseENV15 | EmbeddingModel::BGEBaseENV15Q => 768,
            EmbeddingModel::BGELargeENV15 | EmbeddingModel::BGELargeENV15Q => 1024,
            EmbeddingModel::NomicEmbedTextV15 => 768,
            EmbeddingModel::MultilingualE5Small => 384,
            EmbeddingModel::MultilingualE5Base => 768,
            _ => 384,
        };

        Self {
            model_label: format!("{model_name:?}"),
            model_name,
            dimension,
            model: OnceCell::new(),
        }
    }

    /// Creates an embedding service from a model name string.
    pub fn from_model_str(model_name: &str) -> Result<Self> {
        let model = match model_name {
            "all-MiniLM-L6-v2" | "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
            "all-MiniLM-L6-v2-q" | "AllMiniLML6V2Q" => EmbeddingModel::AllMiniLML6V2Q,
            "all-MiniLM-L12-v2" | "AllMiniLML12V2" => EmbeddingModel::AllMiniLML12V2,
            "bge-small-en-v1.5" | "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" | "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
            "bge-large-en-v1.5" | "BGELargeENV15" => EmbeddingModel::BGELargeENV15,
            "nomic-embed-text-v1.5" | "NomicEmbedTextV15" => EmbeddingModel::NomicEmbedTextV15,
            "multilingual-e5-small" | "MultilingualE5Small" => EmbeddingModel::MultilingualE5Small,
            "multilingual-e5-base" | "MultilingualE5Base" => EmbeddingModel::MultilingualE5Base,
            _ => {
                return Err(RagError::Config(format!(
                    "Unknown embedding model: '{}'. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, nomic-embed-text-v1.5, etc.",
                    model_name
                )));
            }
        };
        let mut service = Self::new(model);
        service.model_label = model_name.to_string();
        Ok(service)
    }

    /// Creates an embedding service from config, validating dimension matches.
    pub fn from_config(model_name: &str, expected_dim: usize) -> Result<Self> {
        let service = Self::from_model_str(model_name)?;
        if service.dimension != expected_dim {
            return Err(RagError::Config(format!(
                "Dimension mismatch: model '{}' produces {}-dim vectors but config specifies {}",
                model_name, service.dimension, expected_dim
            )));
        }
        Ok(service)
    }

    #[instrument(skip(self))]
    fn get_or_init_model(&self) -> Result<Arc<TextEmbedding>> {
        self.model
            .get_or_try_init(|| {
                info!(model = ?self.model_name, "Initializing embedding model");

                let mut options = InitOptions::new(self.model_name.clone());
                options.show_download_progress = true;
                let model = TextEmbedding::try_new(options)
                    .map_err(|e| RagError::Embedding(format!("model init failed: {e}")))?;

                info!(
                    model = ?self.model_name,
                    dimension = self.dimension,
                    "Embedding model initialized"
                );

                Ok(Arc::new(model))
            })
            .cloned()
    }

    /// Pre-warms the model so the first request does not pay the load cost.
    pub async fn warmup(&self) -> Result<()> {
        if self.model.get().is_some() {
            debug!("Model already initialized, skipping warmup");
            return Ok(());
        }
        let model_name = self.model_name.clone();
        info!(model = ?model_name, "Warming up embedding model");
        self.get_or_init_model()?;
        Ok(())
    }

    async fn run_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = self.get_or_init_model()?;

        // fastembed is synchronous
        let embeddings = task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| RagError::Embedding(format!("blocking task failed: {e}")))?
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        Ok(embeddings)
    }
}

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new(EmbeddingModel::AllMiniLML6V2)
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self
            .run_batch(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Empty embedding result".into()))?;

        debug!(dimension = embedding.len(), "Generated embedding");
        Ok(embedding)
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.run_batch(texts.to_vec()).await?;
        debug!(batch_size = embeddings.len(), "Generated batch embeddings");
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_label
    }
}

/// Deterministic embedder: dimension `i` is 1.0 when the lowercased text
/// contains `keywords[i]`, 0.0 otherwise.
pub struct KeywordEmbedder {
    keywords: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.into().to_lowercase())
                .collect(),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .map(|kw| if lower.contains(kw.as_str()) { 1.0 } else { 0.0 })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.keywords.len()
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}
