use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use filings::Document;
use rag_store::{
    BatchFile, CollectionSpec, CollectionStatus, DistanceKind, EmbeddingRecord, IndexLoader,
    LoadMode, LoaderConfig, MemoryStore, Point, RagConfig, RagError, RagStore, SearchHit,
    VectorStore, is_staging_of,
};
use services::retry::RetryPolicy;

const ALIAS: &str = "irs990";

fn records(prefix: &str, n: usize) -> Vec<EmbeddingRecord> {
    (0..n)
        .map(|i| {
            EmbeddingRecord::new(
                Document {
                    ein: Some(format!("{i:09}")),
                    name: Some(format!("{prefix} {i}")),
                    ..Default::default()
                },
                vec![1.0, i as f32],
            )
        })
        .collect()
}

fn ok(records: Vec<EmbeddingRecord>) -> impl Iterator<Item = Result<EmbeddingRecord, RagError>> {
    records.into_iter().map(Ok)
}

fn cfg() -> LoaderConfig {
    LoaderConfig {
        upsert_batch: 2,
        retry: RetryPolicy::new(3, Duration::from_secs(1)),
        ready_poll_interval: Duration::from_secs(1),
        ready_max_polls: 3,
        ..Default::default()
    }
}

async fn names_under_alias(store: &dyn VectorStore) -> Vec<String> {
    let mut names: Vec<String> = store
        .search(ALIAS, &[1.0, 0.0], 1_000)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.payload["Name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    names
}

/// Staging names have microsecond resolution; keep consecutive loads apart.
fn next_tick() {
    std::thread::sleep(Duration::from_millis(2));
}

#[tokio::test]
async fn load_publishes_all_records_under_the_alias() {
    let store = MemoryStore::new();
    let cfg = cfg();
    let loader = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine);

    let report = loader.load_all(ALIAS, ok(records("Org", 5))).await.unwrap();

    assert_eq!(report.records, 5);
    assert_eq!(report.batches, 3);
    assert!(is_staging_of(ALIAS, &report.staging));
    assert_eq!(store.alias_target(ALIAS), Some(report.staging.clone()));
    assert_eq!(store.point_count(ALIAS).unwrap(), 5);
    assert_eq!(store.status(ALIAS).await.unwrap(), CollectionStatus::Green);
}

#[tokio::test]
async fn identical_content_is_not_duplicated() {
    let store = MemoryStore::new();
    let cfg = cfg();
    let loader = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine);

    let mut twice = records("Org", 4);
    twice.extend(records("Org", 4));
    let report = loader.load_all(ALIAS, ok(twice)).await.unwrap();

    assert_eq!(report.records, 8);
    assert_eq!(store.point_count(ALIAS).unwrap(), 4);

    next_tick();
    loader.load_all(ALIAS, ok(records("Org", 4))).await.unwrap();
    assert_eq!(store.point_count(ALIAS).unwrap(), 4);
}

#[tokio::test]
async fn old_staging_collections_are_garbage_collected() {
    let store = MemoryStore::new();
    for name in [
        "irs990-2020-01-01-00-00-00-000000",
        "irs990-test-2020-01-01-00-00-00-000000",
        "other",
    ] {
        store
            .create_collection(&CollectionSpec {
                name: name.into(),
                dim: 2,
                distance: DistanceKind::Cosine,
                indexing_threshold: 0,
            })
            .await
            .unwrap();
    }
    let cfg = cfg();
    let loader = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine);

    let first = loader.load_all(ALIAS, ok(records("Org", 2))).await.unwrap();
    assert_eq!(first.removed, vec!["irs990-2020-01-01-00-00-00-000000".to_string()]);

    next_tick();
    let second = loader.load_all(ALIAS, ok(records("Org", 2))).await.unwrap();
    assert_eq!(second.removed, vec![first.staging]);

    let mut expected = vec![
        "irs990-test-2020-01-01-00-00-00-000000".to_string(),
        "other".to_string(),
        second.staging,
    ];
    expected.sort();
    assert_eq!(store.list_collections().await.unwrap(), expected);
}

/// Looks at the alias every time the loader writes a batch.
struct ObservingStore {
    inner: MemoryStore,
    seen: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl VectorStore for ObservingStore {
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), RagError> {
        self.inner.create_collection(spec).await
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize, RagError> {
        let visible = names_under_alias(&self.inner).await;
        self.seen.lock().unwrap().push(visible);
        self.inner.upsert(collection, points).await
    }

    async fn search(&self, collection: &str, vector: &[f32], k: u64) -> Result<Vec<SearchHit>, RagError> {
        self.inner.search(collection, vector, k).await
    }

    async fn set_indexing_threshold(&self, collection: &str, threshold: u64) -> Result<(), RagError> {
        self.inner.set_indexing_threshold(collection, threshold).await
    }

    async fn status(&self, collection: &str) -> Result<CollectionStatus, RagError> {
        self.inner.status(collection).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, RagError> {
        self.inner.list_collections().await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        self.inner.delete_collection(name).await
    }

    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<bool, RagError> {
        self.inner.swap_alias(alias, collection).await
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, RagError> {
        self.inner.resolve_alias(alias).await
    }
}

#[tokio::test]
async fn readers_see_only_the_old_or_the_new_generation() {
    let store = MemoryStore::new();
    let cfg = cfg();
    IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine)
        .load_all(ALIAS, ok(records("Old", 3)))
        .await
        .unwrap();
    let old = names_under_alias(&store).await;

    next_tick();
    let observing = ObservingStore {
        inner: store,
        seen: Mutex::new(Vec::new()),
    };
    IndexLoader::new(&observing, &cfg, 2, DistanceKind::Cosine)
        .load_all(ALIAS, ok(records("New", 5)))
        .await
        .unwrap();

    let seen = observing.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|names| *names == old));

    let new = names_under_alias(&observing.inner).await;
    assert_eq!(new.len(), 5);
    assert!(new.iter().all(|n| n.starts_with("New")));
}

#[tokio::test]
async fn refused_swap_keeps_the_old_collection_live() {
    let store = MemoryStore::new();
    let cfg = cfg();
    let loader = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine);
    let first = loader.load_all(ALIAS, ok(records("Old", 2))).await.unwrap();

    next_tick();
    store.refuse_alias_swap(true);
    let err = loader.load_all(ALIAS, ok(records("New", 2))).await.unwrap_err();

    assert!(matches!(err, RagError::AliasSwapFailed { .. }));
    assert_eq!(store.alias_target(ALIAS), Some(first.staging.clone()));
    assert_eq!(store.list_collections().await.unwrap(), vec![first.staging]);
    assert!(names_under_alias(&store).await.iter().all(|n| n.starts_with("Old")));
}

#[tokio::test(start_paused = true)]
async fn readiness_poll_gives_up_after_the_configured_polls() {
    let store = MemoryStore::new();
    store.never_ready(true);
    let cfg = cfg();
    let loader = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine);

    let start = tokio::time::Instant::now();
    let err = loader.load_all(ALIAS, ok(records("Org", 2))).await.unwrap_err();

    assert!(matches!(err, RagError::CollectionNeverReady { polls: 3, .. }));
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert_eq!(store.alias_target(ALIAS), None);
    assert!(store.list_collections().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_upsert_failures_are_retried_with_backoff() {
    let store = MemoryStore::new();
    store.fail_next_upserts(2);
    let cfg = cfg();
    let loader = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine);

    let start = tokio::time::Instant::now();
    let report = loader.load_all(ALIAS, ok(records("Org", 4))).await.unwrap();

    assert_eq!(report.records, 4);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(store.point_count(ALIAS).unwrap(), 4);
}

#[tokio::test(start_paused = true)]
async fn exhausted_upsert_retries_abort_the_load() {
    let store = MemoryStore::new();
    let cfg = cfg();
    let loader = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine);
    let first = loader.load_all(ALIAS, ok(records("Old", 2))).await.unwrap();

    next_tick();
    store.fail_next_upserts(100);
    let err = loader.load_all(ALIAS, ok(records("New", 2))).await.unwrap_err();

    assert!(matches!(err, RagError::TooManyRetries { attempts: 3, .. }));
    assert_eq!(store.alias_target(ALIAS), Some(first.staging.clone()));
    assert_eq!(store.list_collections().await.unwrap(), vec![first.staging]);
}

#[tokio::test]
async fn wrong_dimension_and_empty_input_abort_without_a_swap() {
    let store = MemoryStore::new();
    let cfg = cfg();
    let loader = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine);

    let bad = EmbeddingRecord::new(Document::default(), vec![0.0; 3]);
    let err = loader.load_all(ALIAS, ok(vec![bad])).await.unwrap_err();
    assert!(matches!(err, RagError::VectorSizeMismatch { got: 3, want: 2 }));

    next_tick();
    let err = loader.load_all(ALIAS, ok(Vec::new())).await.unwrap_err();
    assert!(matches!(err, RagError::NothingToLoad { .. }));

    assert_eq!(store.alias_target(ALIAS), None);
    assert!(store.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn rag_store_loads_batch_files_from_the_data_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let embeddings = tmp.path().join("embeddings");
    for chunk in 0..2 {
        let path = embeddings.join(rag_store::batch_file::batch_file_name(2023, "01A", chunk));
        let batch = BatchFile::from_records(records(&format!("Chunk{chunk}"), 3));
        rag_store::batch_file::write_batch_file(&path, &batch).unwrap();
    }

    let mut rag_cfg = RagConfig::new_default("http://localhost:6334", ALIAS);
    rag_cfg.embedding_dim = 2;
    let store = Arc::new(MemoryStore::new());
    let rag = RagStore::with_store(rag_cfg, store.clone());

    let loader_cfg = LoaderConfig {
        data_dir: tmp.path().to_path_buf(),
        ..cfg()
    };
    let report = rag
        .load_batch_files(&loader_cfg, None, LoadMode::Full)
        .await
        .unwrap();

    assert_eq!(report.records, 6);
    assert_eq!(store.point_count(ALIAS).unwrap(), 6);

    let empty = LoaderConfig {
        data_dir: tmp.path().join("missing"),
        ..cfg()
    };
    assert!(matches!(
        rag.load_batch_files(&empty, Some("other"), LoadMode::quick()).await,
        Err(RagError::BatchFile { .. })
    ));
}

/// Alias swap whose response is lost: the request may or may not have been
/// applied before the error.
struct LostSwapResponseStore {
    inner: MemoryStore,
    applied: bool,
    lookup_fails: bool,
}

impl LostSwapResponseStore {
    fn new(inner: MemoryStore, applied: bool, lookup_fails: bool) -> Self {
        Self {
            inner,
            applied,
            lookup_fails,
        }
    }
}

#[async_trait]
impl VectorStore for LostSwapResponseStore {
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), RagError> {
        self.inner.create_collection(spec).await
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<usize, RagError> {
        self.inner.upsert(collection, points).await
    }

    async fn search(&self, collection: &str, vector: &[f32], k: u64) -> Result<Vec<SearchHit>, RagError> {
        self.inner.search(collection, vector, k).await
    }

    async fn set_indexing_threshold(&self, collection: &str, threshold: u64) -> Result<(), RagError> {
        self.inner.set_indexing_threshold(collection, threshold).await
    }

    async fn status(&self, collection: &str) -> Result<CollectionStatus, RagError> {
        self.inner.status(collection).await
    }

    async fn list_collections(&self) -> Result<Vec<String>, RagError> {
        self.inner.list_collections().await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        self.inner.delete_collection(name).await
    }

    async fn swap_alias(&self, alias: &str, collection: &str) -> Result<bool, RagError> {
        if self.applied {
            self.inner.swap_alias(alias, collection).await?;
        }
        Err(RagError::Qdrant("connection reset by peer".into()))
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, RagError> {
        if self.lookup_fails {
            return Err(RagError::Qdrant("connection refused".into()));
        }
        self.inner.resolve_alias(alias).await
    }
}

async fn store_with_old_generation() -> (MemoryStore, String) {
    let store = MemoryStore::new();
    let cfg = cfg();
    let first = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine)
        .load_all(ALIAS, ok(records("Old", 2)))
        .await
        .unwrap();
    next_tick();
    (store, first.staging)
}

#[tokio::test]
async fn swap_that_took_effect_despite_an_error_is_published() {
    let (inner, old) = store_with_old_generation().await;
    let store = LostSwapResponseStore::new(inner, true, false);
    let cfg = cfg();

    let report = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine)
        .load_all(ALIAS, ok(records("New", 3)))
        .await
        .unwrap();

    assert_eq!(store.inner.alias_target(ALIAS), Some(report.staging.clone()));
    assert_eq!(report.removed, vec![old]);
    let names = names_under_alias(&store.inner).await;
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| n.starts_with("New")));
}

#[tokio::test]
async fn swap_error_without_effect_keeps_the_old_collection_live() {
    let (inner, old) = store_with_old_generation().await;
    let store = LostSwapResponseStore::new(inner, false, false);
    let cfg = cfg();

    let err = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine)
        .load_all(ALIAS, ok(records("New", 3)))
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::AliasSwapFailed { .. }));
    assert_eq!(store.inner.alias_target(ALIAS), Some(old.clone()));
    assert_eq!(store.inner.list_collections().await.unwrap(), vec![old]);
    assert!(names_under_alias(&store.inner).await.iter().all(|n| n.starts_with("Old")));
}

#[tokio::test]
async fn unknown_alias_state_keeps_the_staging_collection() {
    let (inner, old) = store_with_old_generation().await;
    let store = LostSwapResponseStore::new(inner, true, true);
    let cfg = cfg();

    let err = IndexLoader::new(&store, &cfg, 2, DistanceKind::Cosine)
        .load_all(ALIAS, ok(records("New", 3)))
        .await
        .unwrap_err();

    let RagError::AliasSwapFailed { collection, reason, .. } = err else {
        panic!("expected AliasSwapFailed, got {err:?}");
    };
    assert!(reason.contains(&collection));
    assert_eq!(store.inner.alias_target(ALIAS), Some(collection.clone()));
    assert_eq!(store.inner.point_count(ALIAS).unwrap(), 3);

    let mut expected = vec![old, collection];
    expected.sort();
    assert_eq!(store.inner.list_collections().await.unwrap(), expected);
}
