//! Blue/green bulk load of embedding records into a vector store.
//!
//! 1. create `{stable}-{timestamp}` with indexing disabled
//! 2. upsert fixed-size batches, each under the retry policy
//! 3. restore the indexing threshold and wait until the collection is green
//! 4. repoint the stable alias in one atomic request
//! 5. drop older staging collections of the same stable name
//!
//! Readers only ever query the alias, so they see the old collection until
//! step 4 and the complete new one after it.

use chrono::{DateTime, NaiveDateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use services::retry::retry;
use tracing::{debug, error, info, warn};

use crate::config::{DistanceKind, LoaderConfig};
use crate::errors::RagError;
use crate::record::EmbeddingRecord;
use crate::store::{CollectionSpec, CollectionStatus, Point, VectorStore};

const STAGING_TS_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%6f";

/// Name of a fresh staging collection for `stable` created at `now`.
pub fn staging_name(stable: &str, now: DateTime<Utc>) -> String {
    format!("{stable}-{}", now.format(STAGING_TS_FORMAT))
}

/// True if `name` is `{stable}-{timestamp}` as produced by [`staging_name`].
pub fn is_staging_of(stable: &str, name: &str) -> bool {
    name.strip_prefix(stable)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|ts| NaiveDateTime::parse_from_str(ts, STAGING_TS_FORMAT).is_ok())
}

/// Outcome of a successful [`IndexLoader::load_all`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Collection the alias now points at.
    pub staging: String,
    pub records: usize,
    pub batches: usize,
    /// Older staging collections deleted after the swap.
    pub removed: Vec<String>,
}

/// Loads records into a staging collection and publishes it under an alias.
///
/// Only one load per stable name should run at a time.
pub struct IndexLoader<'a> {
    store: &'a dyn VectorStore,
    cfg: &'a LoaderConfig,
    dim: usize,
    distance: DistanceKind,
}

impl<'a> IndexLoader<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        cfg: &'a LoaderConfig,
        dim: usize,
        distance: DistanceKind,
    ) -> Self {
        Self {
            store,
            cfg,
            dim,
            distance,
        }
    }

    /// Runs the full load for `stable` from `records`.
    ///
    /// On any failure before the alias swap the staging collection is dropped
    /// (best effort) and the alias keeps pointing at the previous collection.
    /// If the swap request itself errors, the alias is read back: a swap that
    /// took effect counts as published, and a staging collection the alias
    /// might point at is never dropped.
    ///
    /// # Errors
    /// - [`RagError::TooManyRetries`] when a batch upsert exhausts its retries
    /// - [`RagError::VectorSizeMismatch`] for a record with the wrong dimension
    /// - [`RagError::CollectionNeverReady`] when the readiness poll runs out
    /// - [`RagError::AliasSwapFailed`] when the swap was refused or failed
    /// - [`RagError::NothingToLoad`] when `records` is empty
    /// - any error yielded by `records` itself
    pub async fn load_all<I>(&self, stable: &str, records: I) -> Result<LoadReport, RagError>
    where
        I: IntoIterator<Item = Result<EmbeddingRecord, RagError>>,
    {
        let staging = staging_name(stable, Utc::now());
        info!(%stable, %staging, dim = self.dim, "starting bulk load");

        self.store
            .create_collection(&CollectionSpec {
                name: staging.clone(),
                dim: self.dim,
                distance: self.distance,
                indexing_threshold: 0,
            })
            .await?;

        let (records, batches) = match self.fill(stable, &staging, records).await {
            Ok(counts) => counts,
            Err(e) => {
                error!(%stable, %staging, error = %e, "bulk load failed, dropping staging collection");
                self.drop_staging(&staging).await;
                return Err(e);
            }
        };

        self.publish(stable, &staging).await?;

        let removed = self.collect_garbage(stable, &staging).await;

        info!(
            %stable,
            %staging,
            records,
            batches,
            removed = removed.len(),
            "bulk load finished"
        );
        Ok(LoadReport {
            staging,
            records,
            batches,
            removed,
        })
    }

    async fn fill<I>(
        &self,
        stable: &str,
        staging: &str,
        records: I,
    ) -> Result<(usize, usize), RagError>
    where
        I: IntoIterator<Item = Result<EmbeddingRecord, RagError>>,
    {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} records ({per_sec}) {msg}")
        {
            pb.set_style(style);
        }

        let batch_size = self.cfg.upsert_batch.max(1);
        let mut batch: Vec<Point> = Vec::with_capacity(batch_size);
        let (mut total, mut batches) = (0usize, 0usize);

        for record in records {
            batch.push(record?.into_point(self.dim)?);
            if batch.len() == batch_size {
                total += self.upsert_batch(staging, &batch).await?;
                batches += 1;
                pb.set_position(total as u64);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            total += self.upsert_batch(staging, &batch).await?;
            batches += 1;
            pb.set_position(total as u64);
        }
        pb.finish_with_message("uploaded");

        if total == 0 {
            return Err(RagError::NothingToLoad {
                collection: stable.to_string(),
            });
        }

        retry("enable indexing", &self.cfg.retry, || {
            self.store
                .set_indexing_threshold(staging, self.cfg.indexing_threshold)
        })
        .await?;

        self.wait_until_ready(staging).await?;
        Ok((total, batches))
    }

    async fn upsert_batch(&self, staging: &str, points: &[Point]) -> Result<usize, RagError> {
        let written = retry("upsert batch", &self.cfg.retry, || {
            self.store.upsert(staging, points.to_vec())
        })
        .await?;
        debug!(%staging, points = written, "batch upserted");
        Ok(written)
    }

    async fn wait_until_ready(&self, staging: &str) -> Result<(), RagError> {
        let max_polls = self.cfg.ready_max_polls.max(1);
        for poll in 1..=max_polls {
            match self.store.status(staging).await? {
                CollectionStatus::Green => {
                    info!(%staging, poll, "collection ready");
                    return Ok(());
                }
                CollectionStatus::Red => {
                    return Err(RagError::Qdrant(format!(
                        "collection {staging} reported status red"
                    )));
                }
                status => debug!(%staging, poll, ?status, "collection not ready yet"),
            }
            if poll < max_polls {
                tokio::time::sleep(self.cfg.ready_poll_interval).await;
            }
        }
        Err(RagError::CollectionNeverReady {
            collection: staging.to_string(),
            polls: max_polls,
        })
    }

    /// Points `stable` at `staging`.
    ///
    /// Only a refusal or a read-back showing another target proves the old
    /// mapping is still live; only then is `staging` dropped.
    async fn publish(&self, stable: &str, staging: &str) -> Result<(), RagError> {
        let failed = |reason: String| RagError::AliasSwapFailed {
            alias: stable.to_string(),
            collection: staging.to_string(),
            reason,
        };

        let swap_err = match self.store.swap_alias(stable, staging).await {
            Ok(true) => {
                info!(alias = %stable, collection = %staging, "alias swapped");
                return Ok(());
            }
            Ok(false) => {
                error!(alias = %stable, collection = %staging, "alias swap refused, dropping staging collection");
                self.drop_staging(staging).await;
                return Err(failed("backend refused the alias update".into()));
            }
            Err(e) => e,
        };

        match self.store.resolve_alias(stable).await {
            Ok(Some(target)) if target == staging => {
                warn!(
                    alias = %stable,
                    collection = %staging,
                    error = %swap_err,
                    "alias swap reported an error but took effect"
                );
                Ok(())
            }
            Ok(target) => {
                error!(
                    alias = %stable,
                    collection = %staging,
                    current = ?target,
                    error = %swap_err,
                    "alias swap failed, dropping staging collection"
                );
                self.drop_staging(staging).await;
                Err(failed(swap_err.to_string()))
            }
            Err(lookup_err) => {
                error!(
                    alias = %stable,
                    collection = %staging,
                    error = %swap_err,
                    lookup_error = %lookup_err,
                    "alias state unknown after failed swap, keeping staging collection"
                );
                Err(failed(format!(
                    "{swap_err}; alias could not be read back ({lookup_err}), staging collection {staging} kept"
                )))
            }
        }
    }

    async fn drop_staging(&self, staging: &str) {
        if let Err(e) = self.store.delete_collection(staging).await {
            warn!(%staging, error = %e, "could not drop staging collection");
        }
    }

    /// Deletes every staging collection of `stable` except `keep`.
    /// Failures are logged; the swap already happened and stays.
    async fn collect_garbage(&self, stable: &str, keep: &str) -> Vec<String> {
        let names = match self.store.list_collections().await {
            Ok(names) => names,
            Err(e) => {
                warn!(%stable, error = %e, "could not list collections for cleanup");
                return Vec::new();
            }
        };

        let mut removed = Vec::new();
        for name in names
            .into_iter()
            .filter(|n| n != keep && is_staging_of(stable, n))
        {
            match self.store.delete_collection(&name).await {
                Ok(()) => {
                    info!(collection = %name, "old collection deleted");
                    removed.push(name);
                }
                Err(e) => warn!(collection = %name, error = %e, "could not delete old collection"),
            }
        }
        removed
    }
}
