//! Unified error types for the crate.

use std::path::PathBuf;

use services::retry::RetryError;
use thiserror::Error;

/// Top-level error for rag-store operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// I/O or filesystem errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing / serialization errors.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Mismatch in vector dimensionality across records.
    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },

    /// Embedding provider failures (wrapped).
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// Qdrant client errors (wrapped).
    #[error("qdrant error: {0}")]
    Qdrant(String),

    /// A batch file exists but does not have the expected shape.
    #[error("invalid batch file {path}: {reason}")]
    BatchFile { path: PathBuf, reason: String },

    /// Filing document could not be converted.
    #[error(transparent)]
    Filing(#[from] filings::FilingError),

    /// An operation kept failing until its retry budget was spent.
    #[error("{operation}: too many retries ({attempts} attempts), last error: {last}")]
    TooManyRetries {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<RagError>,
    },

    /// The alias could not be repointed; the previous collection stays live.
    #[error("alias swap {alias} -> {collection} failed: {reason}")]
    AliasSwapFailed {
        alias: String,
        collection: String,
        reason: String,
    },

    /// The load source produced no records; the live alias is left alone.
    #[error("nothing to load into {collection}")]
    NothingToLoad { collection: String },

    /// The staging collection did not report ready within the poll budget.
    #[error("collection {collection} never became ready after {polls} polls")]
    CollectionNeverReady { collection: String, polls: u32 },
}

impl From<RetryError<RagError>> for RagError {
    fn from(e: RetryError<RagError>) -> Self {
        match e {
            RetryError::TooManyRetries {
                operation,
                attempts,
                last,
            } => RagError::TooManyRetries {
                operation,
                attempts,
                last: Box::new(last),
            },
        }
    }
}

impl From<ai_llm_service::AiLlmError> for RagError {
    fn from(e: ai_llm_service::AiLlmError) -> Self {
        RagError::Provider(e.to_string())
    }
}
