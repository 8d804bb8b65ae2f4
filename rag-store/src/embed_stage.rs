//! Embedding stage: parsed documents → batch files on disk.
//!
//! Documents are split into file chunks (bounded memory per output file),
//! each chunk is embedded in provider-sized batches with bounded concurrency,
//! and every batch call runs under the retry policy.

use std::path::{Path, PathBuf};

use filings::Document;
use futures::stream::{self, StreamExt, TryStreamExt};
use services::retry::{RetryPolicy, retry};
use tracing::{debug, info};

use crate::batch_file::{BatchFile, batch_file_name, write_batch_file};
use crate::embed::{EmbeddingBatch, EmbeddingsProvider};
use crate::errors::RagError;
use crate::record::EmbeddingRecord;

/// Knobs for [`compute_search_embeddings`].
#[derive(Clone, Debug)]
pub struct EmbedStageOptions {
    /// Documents per output file.
    pub file_chunk: usize,
    /// Texts per provider call.
    pub provider_batch: usize,
    /// Provider calls in flight at once.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Only embed the first `limit` documents.
    pub limit: Option<usize>,
}

impl Default for EmbedStageOptions {
    fn default() -> Self {
        Self {
            file_chunk: 5_000,
            provider_batch: 100,
            concurrency: 4,
            retry: RetryPolicy::default(),
            limit: None,
        }
    }
}

/// What the stage produced.
#[derive(Clone, Debug, Default)]
pub struct EmbedStageReport {
    pub files: Vec<PathBuf>,
    pub documents: usize,
    pub total_tokens: u64,
}

/// Embeds `docs` and writes `irs_form_990_embeddings_{year}_{segment}_{chunk}.json`
/// files into `out_dir`.
///
/// # Errors
/// - [`RagError::TooManyRetries`] if a provider batch keeps failing
/// - [`RagError::Provider`] if the provider returns the wrong number of vectors
/// - [`RagError::Io`] / [`RagError::Parse`] if a file cannot be written
pub async fn compute_search_embeddings(
    docs: &[Document],
    provider: &dyn EmbeddingsProvider,
    out_dir: &Path,
    year: u32,
    segment: &str,
    opts: &EmbedStageOptions,
) -> Result<EmbedStageReport, RagError> {
    let docs = match opts.limit {
        Some(limit) => &docs[..limit.min(docs.len())],
        None => docs,
    };
    info!(documents = docs.len(), year, %segment, "embedding documents");

    let mut report = EmbedStageReport::default();

    for (chunk_id, chunk) in docs.chunks(opts.file_chunk.max(1)).enumerate() {
        let (vectors, tokens) = embed_chunk(chunk, provider, opts).await?;

        let records: Vec<EmbeddingRecord> = chunk
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(d, v)| EmbeddingRecord::new(d, v))
            .collect();

        let path = out_dir.join(batch_file_name(year, segment, chunk_id));
        write_batch_file(&path, &BatchFile::from_records(records))?;

        report.files.push(path);
        report.documents += chunk.len();
        report.total_tokens += tokens;
    }

    info!(
        documents = report.documents,
        files = report.files.len(),
        total_tokens = report.total_tokens,
        "embedding stage finished"
    );
    Ok(report)
}

async fn embed_chunk(
    chunk: &[Document],
    provider: &dyn EmbeddingsProvider,
    opts: &EmbedStageOptions,
) -> Result<(Vec<Vec<f32>>, u64), RagError> {
    let texts: Vec<String> = chunk.iter().map(Document::to_context_string).collect();

    let batches: Vec<EmbeddingBatch> = stream::iter(texts.chunks(opts.provider_batch.max(1)))
        .map(|batch| async move {
            let out = retry("embed batch", &opts.retry, || provider.embed_batch(batch)).await?;
            if out.vectors.len() != batch.len() {
                return Err(RagError::Provider(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    out.vectors.len()
                )));
            }
            debug!(texts = batch.len(), tokens = out.total_tokens, "batch embedded");
            Ok::<EmbeddingBatch, RagError>(out)
        })
        .buffered(opts.concurrency.max(1))
        .try_collect()
        .await?;

    let mut vectors = Vec::with_capacity(chunk.len());
    let mut tokens = 0;
    for b in batches {
        tokens += b.total_tokens;
        vectors.extend(b.vectors);
    }
    info!(documents = chunk.len(), total_tokens = tokens, "chunk embedded");
    Ok((vectors, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_file::read_batch_file;
    use crate::embed::EmbedFuture;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Vector = [text length, 1.0]; fails the first `fail_first` calls.
    struct LengthEmbedder {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl EmbeddingsProvider for LengthEmbedder {
        fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, Vec<f32>> {
            Box::pin(async move { Ok(vec![text.len() as f32, 1.0]) })
        }

        fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a, EmbeddingBatch> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.fail_first {
                    return Err(RagError::Provider("rate limited".into()));
                }
                Ok(EmbeddingBatch {
                    vectors: texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect(),
                    total_tokens: texts.len() as u64 * 10,
                })
            })
        }
    }

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document {
                ein: Some(format!("{i}")),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn writes_one_file_per_chunk_and_retries_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LengthEmbedder {
            calls: AtomicU32::new(0),
            fail_first: 1,
        };
        let opts = EmbedStageOptions {
            file_chunk: 5,
            provider_batch: 2,
            concurrency: 1,
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            limit: Some(7),
        };

        let report = compute_search_embeddings(&docs(10), &provider, tmp.path(), 2022, "11C", &opts)
            .await
            .unwrap();

        assert_eq!(report.documents, 7);
        assert_eq!(report.total_tokens, 70);
        assert_eq!(
            report.files,
            vec![
                tmp.path().join("irs_form_990_embeddings_2022_11C_0.json"),
                tmp.path().join("irs_form_990_embeddings_2022_11C_1.json"),
            ]
        );

        let first = read_batch_file(&report.files[0]).unwrap();
        assert_eq!(first.len(), 5);
        let text = first.doc[0].to_context_string();
        assert_eq!(first.embedding[0], vec![text.len() as f32, 1.0]);
        assert_eq!(read_batch_file(&report.files[1]).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abort_the_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LengthEmbedder {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        };
        let opts = EmbedStageOptions {
            retry: RetryPolicy::new(2, Duration::from_secs(1)),
            ..Default::default()
        };
        let err = compute_search_embeddings(&docs(3), &provider, tmp.path(), 2023, "01A", &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::TooManyRetries { attempts: 2, .. }));
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }
}
