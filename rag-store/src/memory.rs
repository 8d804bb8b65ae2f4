//! In-process [`VectorStore`] with exact cosine search.
//!
//! Behaves like the Qdrant backend where the loader can tell the difference:
//! aliases resolve on search/status, a collection reports `Green` only once
//! indexing is enabled, and alias swaps are atomic under one lock. A few
//! switches inject failures for exercising the loader's error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::errors::RagError;
use crate::store::{CollectionSpec, CollectionStatus, Point, SearchHit, VectorStore};

#[derive(Debug)]
struct MemCollection {
    dim: usize,
    indexing_threshold: u64,
    points: BTreeMap<String, (Vec<f32>, Value)>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, MemCollection>,
    aliases: HashMap<String, String>,
    failing_upserts: u32,
    refuse_alias_swap: bool,
    never_ready: bool,
}

impl State {
    fn resolve(&self, name: &str) -> Result<&MemCollection, RagError> {
        let real = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.collections
            .get(real)
            .ok_or_else(|| RagError::Qdrant(format!("collection {name} not found")))
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Makes the next `n` upsert calls fail with a transport-style error.
    pub fn fail_next_upserts(&self, n: u32) {
        self.lock().failing_upserts = n;
    }

    /// Makes `swap_alias` report refusal.
    pub fn refuse_alias_swap(&self, refuse: bool) {
        self.lock().refuse_alias_swap = refuse;
    }

    /// Keeps every collection `Yellow` regardless of indexing.
    pub fn never_ready(&self, never: bool) {
        self.lock().never_ready = never;
    }

    /// Collection currently behind `alias`.
    pub fn alias_target(&self, alias: &str) -> Option<String> {
        self.lock().aliases.get(alias).cloned()
    }

    /// Number of points stored in a collection or alias target.
    pub fn point_count(&self, name: &str) -> Result<usize, RagError> {
        let state = self.lock();
        Ok(state.resolve(name)?.points.len())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), RagError> {
        let mut state = self.lock();
        if state.collections.contains_key(&spec.name) {
            return Err(RagError::Qdrant(format!(
                "collection {} already exists",
                spec.name
            )));
        }
        state.collections.insert(
            spec.name.clone(),
            MemCollection {
                dim: spec.dim,
                indexing_threshold: spec.indexing_threshold,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize, RagError> {
        let mut state = self.lock();
        if state.failing_upserts > 0 {
            state.failing_upserts -= 1;
            return Err(RagError::Qdrant("simulated upsert failure".into()));
        }

        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| RagError::Qdrant(format!("collection {collection} not found")))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != coll.dim) {
            return Err(RagError::VectorSizeMismatch {
                got: bad.vector.len(),
                want: coll.dim,
            });
        }

        let n = points.len();
        for p in points {
            coll.points.insert(p.id, (p.vector, p.payload));
        }
        debug!(%collection, points = n, "memory upsert");
        Ok(n)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: u64,
    ) -> Result<Vec<SearchHit>, RagError> {
        let state = self.lock();
        let coll = state.resolve(collection)?;

        let mut scored: Vec<(f32, &String, &Value)> = coll
            .points
            .iter()
            .map(|(id, (v, payload))| (cosine(vector, v), id, payload))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        Ok(scored
            .into_iter()
            .take(usize::try_from(k).unwrap_or(usize::MAX))
            .map(|(score, _, payload)| SearchHit {
                score,
                payload: payload.clone(),
            })
            .collect())
    }

    async fn set_indexing_threshold(
        &self,
        collection: &str,
        threshold: u64,
    ) -> Result<(), RagError> {
        let mut state = self.lock();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| RagError::Qdrant(format!("collection {collection} not found")))?;
        coll.indexing_threshold = threshold;
        Ok(())
    }

    async fn status(&self, collection: &str) -> Result<CollectionStatus, RagError> {
        let state = self.lock();
        let coll = state.resolve(collection)?;
        if state.never_ready || coll.indexing_threshold == 0 {
            Ok(CollectionStatus::Yellow)
        } else {
            Ok(CollectionStatus::Green)
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>, RagError> {
        let mut names: Vec<String> = self.lock().collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        let mut state = self.lock();
        state.collections.remove(name);
        state.aliases.retain(|_, target| target != name);
        Ok(())
    }

    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<bool, RagError> {
        let mut state = self.lock();
        if state.refuse_alias_swap || !state.collections.contains_key(collection) {
            return Ok(false);
        }
        state.aliases.insert(alias.to_string(), collection.to_string());
        Ok(true)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, RagError> {
        Ok(self.alias_target(alias))
    }
}
