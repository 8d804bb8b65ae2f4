use crate::errors::RagError;
use std::{future::Future, pin::Pin};

/// Boxed future returned by [`EmbeddingsProvider`] methods.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RagError>> + Send + 'a>>;

/// Vectors for a batch of texts plus provider-reported token usage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmbeddingBatch {
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
    pub total_tokens: u64,
}

/// Provider interface for embedding generation.
///
/// Async is required because real providers perform HTTP requests.
/// Implementations must return vectors of one fixed dimensionality.
pub trait EmbeddingsProvider: Send + Sync {
    /// Embeds a single text (used for questions).
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, Vec<f32>>;

    /// Embeds many texts in one call (used for documents).
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a, EmbeddingBatch>;
}

pub mod openai;
