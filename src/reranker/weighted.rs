//! Metadata-weighted score adjustment.

use std::collections::HashMap;

use crate::id::VectorId;
use crate::point::{Metadata, SearchResult};

/// Recomputes each candidate's score as
/// `distance − Σ weights[f] · metadata[id][f]` over numeric fields present
/// in that candidate's metadata, then sorts ascending and truncates to `k`.
///
/// Left intentionally unnormalized: the result is sensitive to the
/// magnitude of `weights` relative to the distance scale in use.
#[must_use]
pub fn rerank_weighted(
    candidates: Vec<SearchResult>,
    k: usize,
    metadata: &HashMap<VectorId, Metadata>,
    weights: &HashMap<String, f32>,
) -> Vec<SearchResult> {
    let mut scored: Vec<(SearchResult, f32)> = candidates
        .into_iter()
        .map(|c| {
            let adjustment = metadata
                .get(&c.id)
                .map(|md| weighted_adjustment(md, weights))
                .unwrap_or(0.0);
            let new_score = c.distance - adjustment;
            (c, new_score)
        })
        .collect();

    scored.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
        .into_iter()
        .map(|(result, new_score)| SearchResult::new(result.id, new_score))
        .collect()
}

fn weighted_adjustment(metadata: &Metadata, weights: &HashMap<String, f32>) -> f32 {
    weights
        .iter()
        .filter_map(|(field, weight)| {
            metadata
                .get(field)
                .and_then(serde_json::Value::as_f64)
                .map(|v| *weight * v as f32)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata_map(entries: Vec<(u64, serde_json::Value)>) -> HashMap<VectorId, Metadata> {
        entries
            .into_iter()
            .map(|(id, v)| {
                let map = v.as_object().unwrap().clone();
                (VectorId::Int(id), map)
            })
            .collect()
    }

    #[test]
    fn higher_weighted_field_moves_candidate_up() {
        let candidates = vec![
            SearchResult::new(VectorId::Int(1), 1.0),
            SearchResult::new(VectorId::Int(2), 1.0),
        ];
        let metadata = metadata_map(vec![
            (1, json!({"popularity": 0.0})),
            (2, json!({"popularity": 10.0})),
        ]);
        let mut weights = HashMap::new();
        weights.insert("popularity".to_string(), 1.0);

        let out = rerank_weighted(candidates, 2, &metadata, &weights);
        assert_eq!(out[0].id, VectorId::Int(2));
        assert!((out[0].distance - (1.0 - 10.0)).abs() < 1e-6);
    }

    #[test]
    fn missing_metadata_leaves_distance_unchanged() {
        let candidates = vec![SearchResult::new(VectorId::Int(1), 2.5)];
        let metadata = HashMap::new();
        let mut weights = HashMap::new();
        weights.insert("x".to_string(), 5.0);

        let out = rerank_weighted(candidates, 1, &metadata, &weights);
        assert!((out[0].distance - 2.5).abs() < 1e-6);
    }

    #[test]
    fn non_numeric_fields_are_ignored() {
        let candidates = vec![SearchResult::new(VectorId::Int(1), 1.0)];
        let metadata = metadata_map(vec![(1, json!({"tag": "featured"}))]);
        let mut weights = HashMap::new();
        weights.insert("tag".to_string(), 2.0);

        let out = rerank_weighted(candidates, 1, &metadata, &weights);
        assert!((out[0].distance - 1.0).abs() < 1e-6);
    }
}
