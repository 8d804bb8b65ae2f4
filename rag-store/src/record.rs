//! Core data models used by the library.

use filings::Document;
use serde_json::Value;
use services::uuid::content_uuid;

use crate::errors::RagError;
use crate::store::Point;

/// Immutable (document, vector) pair produced by the embedding stage.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingRecord {
    pub doc: Document,
    pub embedding: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn new(doc: Document, embedding: Vec<f32>) -> Self {
        Self { doc, embedding }
    }

    /// Converts into a store point with a content-derived id.
    ///
    /// The id depends only on the document payload (canonical, key-sorted),
    /// so loading the same document twice overwrites instead of duplicating.
    ///
    /// # Errors
    /// Returns [`RagError::VectorSizeMismatch`] if the vector is not `dim` long.
    pub fn into_point(self, dim: usize) -> Result<Point, RagError> {
        if self.embedding.len() != dim {
            return Err(RagError::VectorSizeMismatch {
                got: self.embedding.len(),
                want: dim,
            });
        }
        let payload = self.doc.to_payload()?;
        Ok(Point {
            id: point_id(&payload),
            vector: self.embedding,
            payload,
        })
    }
}

/// Deterministic point id for a JSON payload.
pub fn point_id(payload: &Value) -> String {
    content_uuid(payload).to_string()
}

/// A retrieved document with its similarity score.
#[derive(Clone, Debug)]
pub struct RagHit {
    pub score: f32,
    pub document: Document,
    pub raw_payload: Value,
}
