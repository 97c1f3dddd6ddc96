//! Result reranking.
//!
//! Every method takes a candidate list already sorted ascending by distance
//! (lower is better) and returns a reordered list truncated to `k`.

mod mmr;
mod weighted;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::distance::DistanceMetric;
use crate::id::VectorId;
use crate::point::{Metadata, SearchResult};

pub use mmr::rerank_diversity;
pub use weighted::rerank_weighted;

/// Which reranking method a search should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMethod {
    /// Stable top-k slice of the input, no reordering.
    #[default]
    Standard,
    /// Maximal Marginal Relevance diversity reranking.
    Diversity,
    /// Metadata-weighted score adjustment.
    Weighted,
}

/// Side inputs a reranking method may need beyond the candidate list.
#[derive(Debug, Default, Clone)]
pub struct RerankContext<'a> {
    /// The original query vector (required by `Diversity`).
    pub query_vector: Option<&'a [f32]>,
    /// Vectors for candidates, by id (required by `Diversity`).
    pub vectors: Option<&'a HashMap<VectorId, Vec<f32>>>,
    /// Metadata for candidates, by id (required by `Weighted`).
    pub metadata: Option<&'a HashMap<VectorId, Metadata>>,
    /// MMR diversity/relevance trade-off in `[0, 1]` (required by `Diversity`).
    pub lambda: f32,
    /// Field weights for `Weighted` reranking.
    pub weights: Option<&'a HashMap<String, f32>>,
    /// Distance metric to use for any internal distance computation.
    pub distance_metric: DistanceMetric,
}

/// Reranks `candidates` (already sorted ascending by distance) using
/// `method`, returning at most `k` results.
///
/// # Panics
///
/// Does not panic; methods requiring context fields that are absent fall
/// back to `Standard` behavior for the missing input rather than aborting.
#[must_use]
pub fn rerank(
    candidates: Vec<SearchResult>,
    k: usize,
    method: RerankMethod,
    ctx: &RerankContext<'_>,
) -> Vec<SearchResult> {
    match method {
        RerankMethod::Standard => rerank_standard(candidates, k),
        RerankMethod::Diversity => match (ctx.query_vector, ctx.vectors) {
            (Some(query), Some(vectors)) => {
                rerank_diversity(candidates, k, query, vectors, ctx.lambda, ctx.distance_metric)
            }
            _ => rerank_standard(candidates, k),
        },
        RerankMethod::Weighted => match ctx.metadata {
            Some(metadata) => {
                rerank_weighted(candidates, k, metadata, ctx.weights.unwrap_or(&HashMap::new()))
            }
            None => rerank_standard(candidates, k),
        },
    }
}

/// Stable top-k slice, no reordering.
#[must_use]
pub fn rerank_standard(mut candidates: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: u64, dist: f32) -> SearchResult {
        SearchResult::new(VectorId::Int(id), dist)
    }

    #[test]
    fn standard_truncates_without_reordering() {
        let candidates = vec![result(1, 0.1), result(2, 0.2), result(3, 0.3)];
        let out = rerank_standard(candidates, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, VectorId::Int(1));
        assert_eq!(out[1].id, VectorId::Int(2));
    }

    #[test]
    fn dispatch_falls_back_to_standard_when_context_missing() {
        let candidates = vec![result(1, 0.1), result(2, 0.2)];
        let ctx = RerankContext {
            lambda: 0.5,
            distance_metric: DistanceMetric::Euclidean,
            ..Default::default()
        };
        let out = rerank(candidates, 1, RerankMethod::Diversity, &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, VectorId::Int(1));
    }
}
