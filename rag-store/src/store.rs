//! Vector store capability used by the loader and retrieval.
//!
//! Backends: [`crate::QdrantStore`] for production and [`crate::MemoryStore`]
//! for tests and offline runs. Everything above this trait is backend-agnostic.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::DistanceKind;
use crate::errors::RagError;

/// Parameters for a new collection.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    pub dim: usize,
    pub distance: DistanceKind,
    /// `0` disables index building during bulk inserts.
    pub indexing_threshold: u64,
}

/// Coarse collection health as reported by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionStatus {
    /// Fully indexed and ready to serve.
    Green,
    /// Optimizing or indexing in progress.
    Yellow,
    /// Optimizations pending, not started.
    Grey,
    /// Backend reported a failure.
    Red,
}

/// One point to upsert.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    /// UUID string, content-derived.
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One search result.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    pub payload: Value,
}

/// Operations the loader and retrieval need from a vector database.
///
/// `collection` arguments may name either a collection or an alias wherever
/// the backend resolves aliases (search, status).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), RagError>;

    /// Inserts or overwrites points by id. Returns the number written.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize, RagError>;

    /// Top-`k` points by similarity, best first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: u64,
    ) -> Result<Vec<SearchHit>, RagError>;

    async fn set_indexing_threshold(&self, collection: &str, threshold: u64)
    -> Result<(), RagError>;

    async fn status(&self, collection: &str) -> Result<CollectionStatus, RagError>;

    /// Real collection names (aliases excluded).
    async fn list_collections(&self) -> Result<Vec<String>, RagError>;

    async fn delete_collection(&self, name: &str) -> Result<(), RagError>;

    /// Atomically points `alias` at `collection`, replacing any previous
    /// target. `Ok(false)` means the backend refused the change and the old
    /// mapping is still in place.
    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<bool, RagError>;

    /// Collection `alias` currently points at, if any.
    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, RagError>;
}
