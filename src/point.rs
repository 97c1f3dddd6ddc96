//! Stored vector records and search result shapes.

use crate::id::VectorId;
use serde::{Deserialize, Serialize};
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

/// Metadata attached to a stored vector: an unordered string-keyed map whose
/// values may be any JSON type. Opaque to the core except for filter and
/// reranking predicates.
pub type Metadata = JsonMap<String, JsonValue>;

/// A vector together with its id and optional metadata, as stored in a
/// [`crate::store::VectorStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Stable identifier.
    pub id: VectorId,

    /// The stored embedding.
    pub vector: Vec<f32>,

    /// Optional metadata payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl VectorRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(id: VectorId, vector: Vec<f32>, metadata: Option<Metadata>) -> Self {
        Self {
            id,
            vector,
            metadata,
        }
    }

    /// Returns the dimension of the stored vector.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A single `(id, distance)` pair returned by a nearest-neighbor search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Identifier of the matching vector.
    pub id: VectorId,

    /// Distance to the query under whichever metric produced this result.
    /// Lower is nearer, per the convention in [`crate::distance`].
    pub distance: f32,
}

impl SearchResult {
    /// Creates a new search result.
    #[must_use]
    pub const fn new(id: VectorId, distance: f32) -> Self {
        Self { id, distance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_dimension_matches_vector_length() {
        let rec = VectorRecord::new(VectorId::Int(1), vec![1.0, 2.0, 3.0], None);
        assert_eq!(rec.dimension(), 3);
    }
}
