//! Qdrant backend for [`VectorStore`].
//!
//! All collection and point operations go through `qdrant-client` (gRPC).
//! The alias swap is the exception: it needs a delete and a create applied
//! as one request, which is posted to Qdrant's REST `/collections/aliases`
//! endpoint as a single `actions` array.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    CollectionStatus as QStatus, CompressionRatio, CreateCollectionBuilder,
    DeleteCollectionBuilder, Distance, HnswConfigDiffBuilder, OptimizersConfigDiffBuilder,
    PointStruct, ProductQuantizationBuilder, SearchParamsBuilder, SearchPointsBuilder,
    UpdateCollectionBuilder, UpsertPointsBuilder, Value as QValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::{DistanceKind, RagConfig};
use crate::errors::RagError;
use crate::store::{CollectionSpec, CollectionStatus, Point, SearchHit, VectorStore};

/// Production vector store backed by a Qdrant server.
pub struct QdrantStore {
    client: Qdrant,
    http: reqwest::Client,
    rest_url: String,
    api_key: Option<String>,
    exact_search: bool,
}

impl QdrantStore {
    /// Connects using the endpoints and key from `cfg`.
    ///
    /// # Errors
    /// Returns `RagError::Config` on invalid config and `RagError::Qdrant`
    /// if either client cannot be built.
    pub fn new(cfg: &RagConfig) -> Result<Self, RagError> {
        cfg.validate()?;

        let mut builder = Qdrant::from_url(&cfg.qdrant_url);
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        info!(
            grpc = %cfg.qdrant_url,
            rest = %cfg.qdrant_rest_url,
            "QdrantStore initialized"
        );

        Ok(Self {
            client,
            http,
            rest_url: cfg.qdrant_rest_url.trim_end_matches('/').to_string(),
            api_key: cfg.qdrant_api_key.clone(),
            exact_search: cfg.exact_search,
        })
    }
}

/// Segments above this many KB are memory-mapped instead of held in RAM.
const MEMMAP_THRESHOLD_KB: u64 = 20_000;

/// Collection request tuned for a large, read-mostly index: x16 product
/// quantization kept in RAM, full vectors, HNSW graph and payloads on disk.
fn create_request(spec: &CollectionSpec) -> CreateCollectionBuilder {
    let distance = match spec.distance {
        DistanceKind::Cosine => Distance::Cosine,
        DistanceKind::Dot => Distance::Dot,
        DistanceKind::Euclid => Distance::Euclid,
    };

    CreateCollectionBuilder::new(&spec.name)
        .vectors_config(VectorParamsBuilder::new(spec.dim as u64, distance))
        .quantization_config(
            ProductQuantizationBuilder::new(CompressionRatio::X16.into()).always_ram(true),
        )
        .optimizers_config(
            OptimizersConfigDiffBuilder::default()
                .indexing_threshold(spec.indexing_threshold)
                .memmap_threshold(MEMMAP_THRESHOLD_KB),
        )
        .hnsw_config(HnswConfigDiffBuilder::default().on_disk(true))
        .on_disk_payload(true)
}

#[derive(Debug, Deserialize)]
struct AliasUpdateResponse {
    #[serde(default)]
    result: bool,
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), RagError> {
        info!(
            collection = %spec.name,
            dim = spec.dim,
            distance = ?spec.distance,
            indexing_threshold = spec.indexing_threshold,
            "creating collection"
        );

        self.client
            .create_collection(create_request(spec))
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize, RagError> {
        if points.is_empty() {
            return Ok(0);
        }

        let n = points.len();
        let mut qpoints = Vec::with_capacity(n);
        for p in points {
            let payload =
                Payload::try_from(p.payload).map_err(|e| RagError::Qdrant(e.to_string()))?;
            qpoints.push(PointStruct::new(p.id, p.vector, payload));
        }

        let res = self
            .client
            .upsert_points(UpsertPointsBuilder::new(collection, qpoints).wait(true))
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        debug!(%collection, points = n, result = ?res.result, "upsert acknowledged");
        Ok(n)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: u64,
    ) -> Result<Vec<SearchHit>, RagError> {
        let mut builder =
            SearchPointsBuilder::new(collection, vector.to_vec(), k).with_payload(true);
        if self.exact_search {
            builder = builder.params(SearchParamsBuilder::default().exact(true));
        }

        let res = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        let hits: Vec<SearchHit> = res
            .result
            .into_iter()
            .map(|r| SearchHit {
                score: r.score,
                payload: qpayload_to_json(r.payload),
            })
            .collect();

        debug!(%collection, k, hits = hits.len(), "search completed");
        Ok(hits)
    }

    async fn set_indexing_threshold(
        &self,
        collection: &str,
        threshold: u64,
    ) -> Result<(), RagError> {
        self.client
            .update_collection(
                UpdateCollectionBuilder::new(collection).optimizers_config(
                    OptimizersConfigDiffBuilder::default().indexing_threshold(threshold),
                ),
            )
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(())
    }

    async fn status(&self, collection: &str) -> Result<CollectionStatus, RagError> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        let info = info
            .result
            .ok_or_else(|| RagError::Qdrant(format!("no info for collection {collection}")))?;

        Ok(match info.status() {
            QStatus::Green => CollectionStatus::Green,
            QStatus::Yellow => CollectionStatus::Yellow,
            QStatus::Red => CollectionStatus::Red,
            _ => CollectionStatus::Grey,
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>, RagError> {
        let res = self
            .client
            .list_collections()
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(res.collections.into_iter().map(|c| c.name).collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        self.client
            .delete_collection(DeleteCollectionBuilder::new(name))
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(())
    }

    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<bool, RagError> {
        let previous = self.resolve_alias(alias).await?;

        let mut actions = Vec::with_capacity(2);
        if previous.is_some() {
            actions.push(json!({ "delete_alias": { "alias_name": alias } }));
        }
        actions.push(json!({
            "create_alias": { "collection_name": collection, "alias_name": alias }
        }));

        let url = format!("{}/collections/aliases", self.rest_url);
        let mut req = self.http.post(&url).json(&json!({ "actions": actions }));
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(%alias, %collection, %status, body = %body, "alias update rejected");
            return Ok(false);
        }

        let parsed: AliasUpdateResponse = serde_json::from_str(&body)?;
        if parsed.result {
            info!(%alias, %collection, previous = ?previous, "alias repointed");
        } else {
            warn!(%alias, %collection, body = %body, "alias update returned false");
        }
        Ok(parsed.result)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, RagError> {
        let res = self
            .client
            .list_aliases()
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(res
            .aliases
            .into_iter()
            .find(|a| a.alias_name == alias)
            .map(|a| a.collection_name))
    }
}

/// Converts a Qdrant payload (`HashMap<String, qdrant::Value>`) into JSON.
fn qpayload_to_json(p: HashMap<String, QValue>) -> Value {
    let mut m = serde_json::Map::with_capacity(p.len());
    for (k, v) in p {
        m.insert(k, qvalue_to_json(v));
    }
    Value::Object(m)
}

fn qvalue_to_json(v: QValue) -> Value {
    use qdrant_client::qdrant::value::Kind as K;
    match v.kind {
        Some(K::StringValue(s)) => Value::String(s),
        Some(K::IntegerValue(i)) => Value::Number(i.into()),
        Some(K::DoubleValue(f)) => json!(f),
        Some(K::BoolValue(b)) => Value::Bool(b),
        Some(K::StructValue(s)) => qpayload_to_json(s.fields),
        Some(K::ListValue(l)) => Value::Array(l.values.into_iter().map(qvalue_to_json).collect()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{CreateCollection, quantization_config::Quantization};

    #[test]
    fn staging_collections_are_created_with_storage_tuning() {
        let req = CreateCollection::from(create_request(&CollectionSpec {
            name: "irs990-2024-01-01-00-00-00-000000".into(),
            dim: 1536,
            distance: DistanceKind::Cosine,
            indexing_threshold: 0,
        }));

        assert_eq!(req.collection_name, "irs990-2024-01-01-00-00-00-000000");
        assert_eq!(req.on_disk_payload, Some(true));
        assert_eq!(req.hnsw_config.and_then(|h| h.on_disk), Some(true));

        let optimizers = req.optimizers_config.unwrap();
        assert_eq!(optimizers.indexing_threshold, Some(0));
        assert_eq!(optimizers.memmap_threshold, Some(MEMMAP_THRESHOLD_KB));

        let Some(Quantization::Product(pq)) = req.quantization_config.and_then(|q| q.quantization)
        else {
            panic!("expected product quantization");
        };
        assert_eq!(pq.compression, i32::from(CompressionRatio::X16));
        assert_eq!(pq.always_ram, Some(true));
    }
}
