//! Columnar batch files exchanged between the embedding stage and the loader.
//!
//! One JSON document per `(year, segment, chunk)` with two equal-length
//! columns: `{"doc": [Document, ...], "embedding": [[f32, ...], ...]}`.

use std::fs;
use std::path::{Path, PathBuf};

use filings::Document;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::RagError;
use crate::record::EmbeddingRecord;

pub const FILENAME_PREFIX: &str = "irs_form_990_embeddings";

/// Canonical file name for one chunk of a segment.
pub fn batch_file_name(year: u32, segment: &str, chunk: usize) -> String {
    format!("{FILENAME_PREFIX}_{year}_{segment}_{chunk}.json")
}

/// In-memory form of a batch file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchFile {
    pub doc: Vec<Document>,
    pub embedding: Vec<Vec<f32>>,
}

impl BatchFile {
    pub fn from_records(records: Vec<EmbeddingRecord>) -> Self {
        let (doc, embedding) = records.into_iter().map(|r| (r.doc, r.embedding)).unzip();
        Self { doc, embedding }
    }

    pub fn into_records(self) -> Vec<EmbeddingRecord> {
        self.doc
            .into_iter()
            .zip(self.embedding)
            .map(|(d, e)| EmbeddingRecord::new(d, e))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.doc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }
}

/// Reads and validates one batch file.
///
/// # Errors
/// - [`RagError::Io`] / [`RagError::Parse`] on read or JSON failures
/// - [`RagError::BatchFile`] if the two columns differ in length
pub fn read_batch_file(path: &Path) -> Result<BatchFile, RagError> {
    let data = fs::read(path)?;
    let batch: BatchFile = serde_json::from_slice(&data)?;
    if batch.doc.len() != batch.embedding.len() {
        return Err(RagError::BatchFile {
            path: path.to_path_buf(),
            reason: format!(
                "{} docs but {} embeddings",
                batch.doc.len(),
                batch.embedding.len()
            ),
        });
    }
    debug!(path = %path.display(), records = batch.len(), "batch file read");
    Ok(batch)
}

/// Writes a batch file through a sibling temp file and a rename, so readers
/// never see a partially written file.
///
/// # Errors
/// Returns [`RagError::Io`] / [`RagError::Parse`] on failure.
pub fn write_batch_file(path: &Path, batch: &BatchFile) -> Result<(), RagError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec(batch)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), records = batch.len(), "batch file written");
    Ok(())
}

/// All batch files under `dir`, sorted by name.
///
/// # Errors
/// Returns [`RagError::Config`] if `dir` cannot be turned into a glob pattern.
pub fn list_batch_files(dir: &Path) -> Result<Vec<PathBuf>, RagError> {
    let pattern = dir.join(format!("{FILENAME_PREFIX}*.json"));
    let pattern = pattern
        .to_str()
        .ok_or_else(|| RagError::Config(format!("non UTF-8 path: {}", dir.display())))?;
    let mut files: Vec<PathBuf> = glob::glob(pattern)
        .map_err(|e| RagError::Config(e.to_string()))?
        .filter_map(Result::ok)
        .collect();
    files.sort();
    Ok(files)
}

/// Which part of the batch files a load covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Every record of every file.
    Full,
    /// A reproducible sample for quick iteration.
    Quick {
        file_limit: usize,
        record_limit: usize,
        seed: u64,
    },
}

impl LoadMode {
    pub fn quick() -> Self {
        LoadMode::Quick {
            file_limit: 10,
            record_limit: 500,
            seed: 42,
        }
    }
}

/// Lazily yields records from `files`, one file in memory at a time.
///
/// In quick mode at most `file_limit` files are picked and at most
/// `record_limit` records per file, both sampled with the seeded RNG.
pub fn batch_records(files: Vec<PathBuf>, mode: LoadMode) -> BatchRecords {
    let (files, sample) = match mode {
        LoadMode::Full => (files, None),
        LoadMode::Quick {
            file_limit,
            record_limit,
            seed,
        } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked: Vec<PathBuf> = files
                .choose_multiple(&mut rng, file_limit.min(files.len()))
                .cloned()
                .collect();
            (picked, Some((record_limit, rng)))
        }
    };

    info!(files = files.len(), ?mode, "batch files selected");

    BatchRecords {
        files: files.into_iter(),
        current: Vec::new().into_iter(),
        sample,
    }
}

/// Iterator returned by [`batch_records`].
pub struct BatchRecords {
    files: std::vec::IntoIter<PathBuf>,
    current: std::vec::IntoIter<EmbeddingRecord>,
    sample: Option<(usize, StdRng)>,
}

impl BatchRecords {
    fn sampled(&mut self, records: Vec<EmbeddingRecord>) -> Vec<EmbeddingRecord> {
        let Some((limit, rng)) = self.sample.as_mut() else {
            return records;
        };
        if records.len() <= *limit {
            return records;
        }
        let mut picked = rand::seq::index::sample(rng, records.len(), *limit).into_vec();
        picked.sort_unstable();
        let mut slots: Vec<Option<EmbeddingRecord>> = records.into_iter().map(Some).collect();
        picked.into_iter().filter_map(|i| slots[i].take()).collect()
    }
}

impl Iterator for BatchRecords {
    type Item = Result<EmbeddingRecord, RagError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(r) = self.current.next() {
                return Some(Ok(r));
            }
            let path = self.files.next()?;
            match read_batch_file(&path) {
                Ok(batch) => {
                    let records = self.sampled(batch.into_records());
                    debug!(path = %path.display(), records = records.len(), "loading batch file");
                    self.current = records.into_iter();
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<EmbeddingRecord> {
        (0..n)
            .map(|i| {
                EmbeddingRecord::new(
                    Document {
                        ein: Some(format!("{i:09}")),
                        total_revenue: Some(i as f64 * 1.5),
                        ..Default::default()
                    },
                    vec![i as f32 * 0.1, 0.333_333_34, -1.0e-7],
                )
            })
            .collect()
    }

    #[test]
    fn file_names_follow_the_segment_pattern() {
        assert_eq!(
            batch_file_name(2023, "05B", 3),
            "irs_form_990_embeddings_2023_05B_3.json"
        );
    }

    #[test]
    fn written_files_read_back_identically() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("embeddings").join(batch_file_name(2022, "01A", 0));
        let batch = BatchFile::from_records(records(3));

        write_batch_file(&path, &batch).unwrap();

        assert_eq!(read_batch_file(&path).unwrap(), batch);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, r#"{"doc":[{"EIN":"1"}],"embedding":[]}"#).unwrap();
        assert!(matches!(
            read_batch_file(&path),
            Err(RagError::BatchFile { .. })
        ));
    }

    #[test]
    fn quick_mode_samples_files_and_records_reproducibly() {
        let tmp = tempfile::tempdir().unwrap();
        for chunk in 0..4 {
            let batch = BatchFile::from_records(records(20));
            write_batch_file(&tmp.path().join(batch_file_name(2023, "01A", chunk)), &batch)
                .unwrap();
        }
        fs::write(tmp.path().join("unrelated.json"), "{}").unwrap();

        let files = list_batch_files(tmp.path()).unwrap();
        assert_eq!(files.len(), 4);

        let mode = LoadMode::Quick {
            file_limit: 2,
            record_limit: 5,
            seed: 42,
        };
        let first: Vec<_> = batch_records(files.clone(), mode)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let second: Vec<_> = batch_records(files.clone(), mode)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first, second);

        let full = batch_records(files, LoadMode::Full).count();
        assert_eq!(full, 80);
    }
}
