//! OpenAI embedding provider implementation.

use ai_llm_service::OpenAiService;

use super::{EmbedFuture, EmbeddingBatch, EmbeddingsProvider};
use crate::errors::RagError;

/// OpenAI embedding provider (async) with a dimension guard.
#[derive(Clone, Debug)]
pub struct OpenAiEmbedder {
    svc: OpenAiService,
    dim: usize,
}

impl OpenAiEmbedder {
    /// `svc` must be configured with an embedding model producing `dim`-long vectors.
    pub fn new(svc: OpenAiService, dim: usize) -> Self {
        Self { svc, dim }
    }

    fn check(&self, v: &[f32]) -> Result<(), RagError> {
        if v.len() != self.dim {
            return Err(RagError::VectorSizeMismatch {
                got: v.len(),
                want: self.dim,
            });
        }
        Ok(())
    }
}

impl EmbeddingsProvider for OpenAiEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, Vec<f32>> {
        Box::pin(async move {
            let v = self.svc.embeddings(text).await?;
            self.check(&v)?;
            Ok(v)
        })
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> EmbedFuture<'a, EmbeddingBatch> {
        Box::pin(async move {
            let out = self.svc.embeddings_batch(texts).await?;
            for v in &out.vectors {
                self.check(v)?;
            }
            Ok(EmbeddingBatch {
                vectors: out.vectors,
                total_tokens: out.total_tokens,
            })
        })
    }
}
