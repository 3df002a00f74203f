//! Application state for the API server.

use std::sync::Arc;

use neurorag_llm::{build_llm_client, AnswerGenerator};
use neurorag_memory::{default_tokenizer, ContextAssembler, EmbeddingService, MemoryManager};
use tracing::info;

use crate::config::AppConfig;
use crate::document::{DocumentExtractor, PdfExtractor};

/// Shared application state for the API server.
pub struct AppState {
    /// Chunk store, index and eviction policy behind one lock
    pub memory: Arc<MemoryManager>,

    /// Packs retrieved passages into the prompt budget
    pub assembler: ContextAssembler,

    pub generator: AnswerGenerator,

    pub extractor: Arc<dyn DocumentExtractor>,

    pub config: AppConfig,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Assemble state from already-built components.
    pub fn new(
        config: AppConfig,
        memory: Arc<MemoryManager>,
        generator: AnswerGenerator,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        let assembler = ContextAssembler::new(
            Arc::from(default_tokenizer()),
            config.memory.context_token_budget,
        );
        Self {
            memory,
            assembler,
            generator,
            extractor,
            config,
            start_time: std::time::Instant::now(),
        }
    }

    /// Build the production stack: fastembed model, configured LLM, PDF extraction.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.server.temp_dir)?;

        let embedder = EmbeddingService::from_config(
            &config.memory.embedding_model,
            config.memory.embedding_dim,
        )?;
        embedder.warmup().await?;

        let memory = MemoryManager::open(config.memory.clone(), Arc::new(embedder))?;
        let client = build_llm_client(&config.llm)?;
        let generator = AnswerGenerator::new(client, config.generation.clone());

        info!(
            chunks = memory.len().await,
            llm = generator.model_name(),
            "Application state ready"
        );

        Ok(Self::new(
            config,
            Arc::new(memory),
            generator,
            Arc::new(PdfExtractor::new()),
        ))
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
