//! Runtime, collection and loader configuration.
//!
//! Both structs read environment variables through `from_env()`, or through
//! any `Fn(&str) -> Option<String>` via `from_lookup()`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use services::retry::RetryPolicy;

use crate::errors::RagError;

/// Distance function used for the vector space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistanceKind {
    /// Cosine distance (recommended for most embeddings).
    Cosine,
    /// Dot product (useful for normalized vectors).
    Dot,
    /// Euclidean distance (L2).
    Euclid,
}

impl FromStr for DistanceKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "euclid" => Ok(Self::Euclid),
            other => Err(RagError::Config(format!("unknown distance: {other}"))),
        }
    }
}

/// Configuration for the vector store connection and retrieval.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// Qdrant gRPC endpoint, e.g. `http://localhost:6334`.
    pub qdrant_url: String,
    /// Qdrant REST endpoint, e.g. `http://localhost:6333` (alias updates).
    pub qdrant_rest_url: String,
    /// Optional API key for Qdrant Cloud.
    pub qdrant_api_key: Option<String>,
    /// Stable alias that readers query.
    pub collection: String,
    /// Vector dimensionality D shared by the whole index.
    pub embedding_dim: usize,
    /// Distance function (Cosine by default).
    pub distance: DistanceKind,
    /// Documents fetched per question.
    pub top_k: u64,
    /// Exact search flag (false = HNSW ANN).
    pub exact_search: bool,
}

impl RagConfig {
    /// Creates a sane default config for a given collection name and Qdrant endpoint.
    pub fn new_default(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            qdrant_url: url.into(),
            qdrant_rest_url: "http://localhost:6333".into(),
            qdrant_api_key: None,
            collection: collection.into(),
            embedding_dim: 1536,
            distance: DistanceKind::Cosine,
            top_k: 100,
            exact_search: false,
        }
    }

    /// Reads the config from process environment variables.
    pub fn from_env() -> Result<Self, RagError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Reads the config from an arbitrary variable source.
    ///
    /// # Errors
    /// Returns `RagError::Config` on unparsable values or failed validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::new_default(
            string_or(&lookup, "QDRANT_URL", "http://localhost:6334"),
            string_or(&lookup, "QDRANT_COLLECTION", "irs990"),
        );
        cfg.qdrant_rest_url = string_or(&lookup, "QDRANT_REST_URL", &cfg.qdrant_rest_url);
        cfg.qdrant_api_key = non_empty(&lookup, "QDRANT_API_KEY");
        cfg.embedding_dim = parse_or(&lookup, "EMBEDDING_DIM", cfg.embedding_dim)?;
        cfg.top_k = parse_or(&lookup, "RAG_TOP_K", cfg.top_k)?;
        if let Some(d) = non_empty(&lookup, "QDRANT_DISTANCE") {
            cfg.distance = d.parse()?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.qdrant_url.trim().is_empty() {
            return Err(RagError::Config("qdrant_url is empty".into()));
        }
        if self.collection.trim().is_empty() {
            return Err(RagError::Config("collection is empty".into()));
        }
        if self.embedding_dim == 0 {
            return Err(RagError::Config("embedding_dim must be > 0".into()));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be > 0".into()));
        }
        Ok(())
    }
}

/// Configuration for the bulk loader and batch files.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Records per upsert call.
    pub upsert_batch: usize,
    /// Optimizer indexing threshold restored after the bulk insert.
    pub indexing_threshold: u64,
    /// Back-off applied to each batch upsert.
    pub retry: RetryPolicy,
    /// Pause between readiness checks.
    pub ready_poll_interval: Duration,
    /// Readiness checks before giving up.
    pub ready_max_polls: u32,
    /// Root holding `embeddings/`.
    pub data_dir: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            upsert_batch: 50,
            indexing_threshold: 20_000,
            retry: RetryPolicy::default(),
            ready_poll_interval: Duration::from_secs(5),
            ready_max_polls: 360,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl LoaderConfig {
    pub fn from_env() -> Result<Self, RagError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// # Errors
    /// Returns `RagError::Config` on unparsable or zero values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let cfg = Self {
            upsert_batch: parse_or(&lookup, "UPSERT_BATCH_SIZE", d.upsert_batch)?,
            indexing_threshold: parse_or(&lookup, "INDEXING_THRESHOLD", d.indexing_threshold)?,
            retry: RetryPolicy::new(
                parse_or(&lookup, "RETRY_MAX_ATTEMPTS", d.retry.max_attempts)?,
                Duration::from_secs(parse_or(
                    &lookup,
                    "RETRY_INITIAL_WAIT_SECS",
                    d.retry.initial_wait.as_secs(),
                )?),
            ),
            ready_poll_interval: Duration::from_secs(parse_or(
                &lookup,
                "READY_POLL_INTERVAL_SECS",
                d.ready_poll_interval.as_secs(),
            )?),
            ready_max_polls: parse_or(&lookup, "READY_MAX_POLLS", d.ready_max_polls)?,
            data_dir: non_empty(&lookup, "DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.data_dir),
        };
        if cfg.upsert_batch == 0 {
            return Err(RagError::Config("upsert_batch must be > 0".into()));
        }
        if cfg.ready_max_polls == 0 {
            return Err(RagError::Config("ready_max_polls must be > 0".into()));
        }
        Ok(cfg)
    }

    /// Directory holding the embedding batch files.
    pub fn embeddings_dir(&self) -> PathBuf {
        self.data_dir.join("embeddings")
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn string_or<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, name).unwrap_or_else(|| default.to_string())
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, RagError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, name) {
        Some(v) => v
            .parse()
            .map_err(|_| RagError::Config(format!("{name}: cannot parse {v:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_loader_constants() {
        let rag = RagConfig::from_lookup(|_| None).unwrap();
        assert_eq!(rag.collection, "irs990");
        assert_eq!(rag.embedding_dim, 1536);
        assert_eq!(rag.top_k, 100);
        assert_eq!(rag.distance, DistanceKind::Cosine);

        let load = LoaderConfig::from_lookup(|_| None).unwrap();
        assert_eq!(load.upsert_batch, 50);
        assert_eq!(load.indexing_threshold, 20_000);
        assert_eq!(load.retry, RetryPolicy::default());
        assert_eq!(load.embeddings_dir(), PathBuf::from("data/embeddings"));
    }

    #[test]
    fn overrides_and_errors() {
        let load = LoaderConfig::from_lookup(|k| match k {
            "UPSERT_BATCH_SIZE" => Some("100".into()),
            "RETRY_MAX_ATTEMPTS" => Some("2".into()),
            "DATA_DIR" => Some("/srv/irs".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(load.upsert_batch, 100);
        assert_eq!(load.retry.max_attempts, 2);
        assert_eq!(load.data_dir, PathBuf::from("/srv/irs"));

        assert!(LoaderConfig::from_lookup(|k| (k == "UPSERT_BATCH_SIZE").then(|| "0".into())).is_err());
        assert!(RagConfig::from_lookup(|k| (k == "EMBEDDING_DIM").then(|| "wide".into())).is_err());
        assert!(RagConfig::from_lookup(|k| (k == "QDRANT_DISTANCE").then(|| "manhattan".into())).is_err());
    }
}
