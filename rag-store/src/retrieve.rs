//! Retrieval: embed a question and fetch the nearest filings.

use filings::Document;
use tracing::{trace, warn};

use crate::embed::EmbeddingsProvider;
use crate::errors::RagError;
use crate::record::RagHit;
use crate::store::VectorStore;

/// Embeds `question` and returns the `top_k` nearest documents from
/// `collection` (usually the stable alias), best first.
///
/// Hits whose payload no longer decodes as a [`Document`] are skipped with a
/// warning rather than failing the whole question.
///
/// # Errors
/// Returns embedding/provider errors or vector store failures.
pub async fn rag_context(
    store: &dyn VectorStore,
    collection: &str,
    provider: &dyn EmbeddingsProvider,
    question: &str,
    top_k: u64,
) -> Result<Vec<RagHit>, RagError> {
    trace!(%collection, top_k, "retrieve::rag_context");

    let qv = provider.embed(question).await?;
    let hits = store.search(collection, &qv, top_k).await?;

    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        match Document::from_payload(hit.payload.clone()) {
            Ok(document) => out.push(RagHit {
                score: hit.score,
                document,
                raw_payload: hit.payload,
            }),
            Err(e) => warn!(%collection, error = %e, "skipping undecodable payload"),
        }
    }
    Ok(out)
}
