//! Vector index for filing documents: embedding, bulk loading and retrieval.
//!
//! This crate provides:
//! - a backend-agnostic [`VectorStore`] capability with Qdrant and in-memory backends
//! - the embedding stage that turns parsed filings into batch files
//! - a blue/green [`IndexLoader`] that publishes a fully built collection under an alias
//! - top-K retrieval for a question
//!
//! The design is flat (no deep nesting) and splits responsibilities into focused modules.

pub mod batch_file;
mod config;
mod embed;
pub mod embed_stage;
mod errors;
mod loader;
mod memory;
mod qdrant_facade;
mod record;
mod retrieve;
mod store;

use std::sync::Arc;

pub use batch_file::{BatchFile, LoadMode};
pub use config::{DistanceKind, LoaderConfig, RagConfig};
pub use embed::openai::OpenAiEmbedder;
pub use embed::{EmbedFuture, EmbeddingBatch, EmbeddingsProvider};
pub use embed_stage::{EmbedStageOptions, EmbedStageReport, compute_search_embeddings};
pub use errors::RagError;
pub use loader::{IndexLoader, LoadReport, is_staging_of, staging_name};
pub use memory::MemoryStore;
pub use qdrant_facade::QdrantStore;
pub use record::{EmbeddingRecord, RagHit, point_id};
pub use retrieve::rag_context;
pub use store::{CollectionSpec, CollectionStatus, Point, SearchHit, VectorStore};

use tracing::{debug, info, trace};

/// High-level facade that wires configuration and a vector store backend.
///
/// This is the single entry point recommended for application code.
#[derive(Clone)]
pub struct RagStore {
    cfg: RagConfig,
    store: Arc<dyn VectorStore>,
}

impl RagStore {
    /// Connects to Qdrant using `cfg`.
    ///
    /// # Errors
    /// Returns `RagError::Config` / `RagError::Qdrant` if the client cannot be built.
    pub fn new(cfg: RagConfig) -> Result<Self, RagError> {
        trace!("RagStore::new collection={}", cfg.collection);
        let store = QdrantStore::new(&cfg)?;
        Ok(Self::with_store(cfg, Arc::new(store)))
    }

    /// Uses an already constructed backend, e.g. [`MemoryStore`].
    pub fn with_store(cfg: RagConfig, store: Arc<dyn VectorStore>) -> Self {
        Self { cfg, store }
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    /// Bulk-loads `records` and publishes them under `alias`
    /// (the configured collection when `None`).
    ///
    /// # Errors
    /// See [`IndexLoader::load_all`].
    pub async fn load_all<I>(
        &self,
        loader: &LoaderConfig,
        alias: Option<&str>,
        records: I,
    ) -> Result<LoadReport, RagError>
    where
        I: IntoIterator<Item = Result<EmbeddingRecord, RagError>>,
    {
        let alias = alias.unwrap_or(&self.cfg.collection);
        IndexLoader::new(
            self.store.as_ref(),
            loader,
            self.cfg.embedding_dim,
            self.cfg.distance,
        )
        .load_all(alias, records)
        .await
    }

    /// Loads the batch files under `{data_dir}/embeddings`, all of them or a
    /// sample depending on `mode`.
    ///
    /// # Errors
    /// Returns `RagError::BatchFile` when no batch file exists, otherwise see
    /// [`IndexLoader::load_all`].
    pub async fn load_batch_files(
        &self,
        loader: &LoaderConfig,
        alias: Option<&str>,
        mode: LoadMode,
    ) -> Result<LoadReport, RagError> {
        let dir = loader.embeddings_dir();
        let files = batch_file::list_batch_files(&dir)?;
        if files.is_empty() {
            return Err(RagError::BatchFile {
                path: dir,
                reason: "no batch files found".into(),
            });
        }
        info!(dir = %dir.display(), files = files.len(), ?mode, "loading batch files");
        self.load_all(loader, alias, batch_file::batch_records(files, mode))
            .await
    }

    /// Top-K documents for `question` from the live alias.
    ///
    /// # Errors
    /// Returns embedding errors or vector store failures.
    pub async fn rag_context(
        &self,
        provider: &dyn EmbeddingsProvider,
        question: &str,
    ) -> Result<Vec<RagHit>, RagError> {
        debug!(collection = %self.cfg.collection, top_k = self.cfg.top_k, "RagStore::rag_context");
        retrieve::rag_context(
            self.store.as_ref(),
            &self.cfg.collection,
            provider,
            question,
            self.cfg.top_k,
        )
        .await
    }
}
