//! Typed error for the contextor crate.

use services::retry::RetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextorError {
    /// Errors from the underlying rag-store crate (embedding, search).
    #[error("RAG error: {0}")]
    Rag(#[from] rag_store::RagError),

    /// Completion provider errors (HTTP status, transport, decode).
    #[error("LLM error: {0}")]
    Llm(#[from] ai_llm_service::AiLlmError),

    /// Invalid environment configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The tokenizer could not be loaded.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The caller cancelled the question while a completion was streaming.
    #[error("cancelled")]
    Cancelled,

    /// One completion attempt ran past its deadline.
    #[error("completion stream timed out after {secs}s")]
    StreamTimeout { secs: u64 },

    /// Opening the completion stream kept failing.
    #[error("{operation}: too many retries ({attempts} attempts), last error: {last}")]
    TooManyRetries {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<ContextorError>,
    },
}

impl From<RetryError<ContextorError>> for ContextorError {
    fn from(e: RetryError<ContextorError>) -> Self {
        match e {
            RetryError::TooManyRetries {
                operation,
                attempts,
                last,
            } => ContextorError::TooManyRetries {
                operation,
                attempts,
                last: Box::new(last),
            },
        }
    }
}
