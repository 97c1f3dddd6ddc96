//! Maximal Marginal Relevance diversity reranking.

use std::collections::HashMap;

use crate::distance::DistanceMetric;
use crate::id::VectorId;
use crate::point::SearchResult;

/// Iteratively selects up to `k` candidates, maximizing
/// `λ · (1/(1+dist_to_query)) + (1−λ) · min_dist_to_already_selected` at
/// each step. The first selection is the candidate nearest the query.
/// Candidates with no retrievable vector in `vectors` are skipped.
#[must_use]
pub fn rerank_diversity(
    candidates: Vec<SearchResult>,
    k: usize,
    query: &[f32],
    vectors: &HashMap<VectorId, Vec<f32>>,
    lambda: f32,
    metric: DistanceMetric,
) -> Vec<SearchResult> {
    let mut pool: Vec<(VectorId, f32, &[f32])> = Vec::with_capacity(candidates.len());
    for c in &candidates {
        match vectors.get(&c.id) {
            Some(v) => pool.push((c.id.clone(), c.distance, v.as_slice())),
            None => {
                tracing::warn!(id = %c.id, "diversity rerank: candidate has no retrievable vector, skipping");
            }
        }
    }

    let mut selected: Vec<SearchResult> = Vec::with_capacity(k.min(pool.len()));
    let mut selected_vectors: Vec<&[f32]> = Vec::with_capacity(k.min(pool.len()));

    while selected.len() < k && !pool.is_empty() {
        let pick_idx = if selected.is_empty() {
            pool.iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    let da = metric.calculate(query, a.2, 0.0);
                    let db = metric.calculate(query, b.2, 0.0);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i)
        } else {
            pool.iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    let sa = mmr_score(query, a.2, &selected_vectors, lambda, metric);
                    let sb = mmr_score(query, b.2, &selected_vectors, lambda, metric);
                    sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i)
        };

        let Some(idx) = pick_idx else { break };
        let (id, distance, vector) = pool.remove(idx);
        selected_vectors.push(vector);
        selected.push(SearchResult::new(id, distance));
    }

    selected
}

fn mmr_score(
    query: &[f32],
    candidate: &[f32],
    selected: &[&[f32]],
    lambda: f32,
    metric: DistanceMetric,
) -> f32 {
    let dist_to_query = metric.calculate(query, candidate, 0.0);
    let relevance = 1.0 / (1.0 + dist_to_query);

    let diversity = selected
        .iter()
        .map(|s| metric.calculate(candidate, s, 0.0))
        .fold(f32::INFINITY, f32::min);

    lambda * relevance + (1.0 - lambda) * diversity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_selection_is_nearest_to_query() {
        let query = vec![0.0, 0.0];
        let mut vectors = HashMap::new();
        vectors.insert(VectorId::Int(1), vec![1.0, 0.0]);
        vectors.insert(VectorId::Int(2), vec![5.0, 0.0]);
        let candidates = vec![
            SearchResult::new(VectorId::Int(2), 5.0),
            SearchResult::new(VectorId::Int(1), 1.0),
        ];
        let out = rerank_diversity(candidates, 1, &query, &vectors, 0.5, DistanceMetric::Euclidean);
        assert_eq!(out[0].id, VectorId::Int(1));
    }

    #[test]
    fn skips_candidates_with_missing_vector() {
        let query = vec![0.0, 0.0];
        let mut vectors = HashMap::new();
        vectors.insert(VectorId::Int(1), vec![1.0, 0.0]);
        let candidates = vec![
            SearchResult::new(VectorId::Int(1), 1.0),
            SearchResult::new(VectorId::Int(99), 2.0),
        ];
        let out = rerank_diversity(candidates, 2, &query, &vectors, 0.5, DistanceMetric::Euclidean);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, VectorId::Int(1));
    }

    #[test]
    fn diversity_prefers_spread_out_candidates() {
        let query = vec![0.0, 0.0];
        let mut vectors = HashMap::new();
        vectors.insert(VectorId::Int(1), vec![1.0, 0.0]);
        vectors.insert(VectorId::Int(2), vec![1.1, 0.0]);
        vectors.insert(VectorId::Int(3), vec![0.0, 5.0]);
        let candidates = vec![
            SearchResult::new(VectorId::Int(1), 1.0),
            SearchResult::new(VectorId::Int(2), 1.1),
            SearchResult::new(VectorId::Int(3), 5.0),
        ];
        // lambda=0 => pure diversity after the first pick
        let out = rerank_diversity(candidates, 2, &query, &vectors, 0.0, DistanceMetric::Euclidean);
        assert_eq!(out[0].id, VectorId::Int(1));
        assert_eq!(out[1].id, VectorId::Int(3));
    }
}
