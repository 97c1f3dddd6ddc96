//! Result-cache key construction.
//!
//! Keyed by `(quantized_query_fingerprint, k, metric, filter_fingerprint,
//! partition_set)`. The query is quantized to a fixed number of decimal
//! places so near-identical floating point queries (the common case for a
//! client re-issuing "the same" search) still hit the cache.

use crate::distance::DistanceMetric;
use crate::filter::FilterPredicate;

use super::SearchOptions;

/// A hashable, cloneable cache key over a search's shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query_fingerprint: String,
    k: usize,
    metric: Option<DistanceMetricTag>,
    filter_fingerprint: String,
    partition_set: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DistanceMetricTag {
    Euclidean,
    SquaredEuclidean,
    Cosine,
    Manhattan,
    Chebyshev,
    InnerProduct,
    Hamming,
}

impl From<DistanceMetric> for DistanceMetricTag {
    fn from(m: DistanceMetric) -> Self {
        match m {
            DistanceMetric::Euclidean => Self::Euclidean,
            DistanceMetric::SquaredEuclidean => Self::SquaredEuclidean,
            DistanceMetric::Cosine => Self::Cosine,
            DistanceMetric::Manhattan => Self::Manhattan,
            DistanceMetric::Chebyshev => Self::Chebyshev,
            DistanceMetric::InnerProduct => Self::InnerProduct,
            DistanceMetric::Hamming => Self::Hamming,
        }
    }
}

impl CacheKey {
    pub fn build(query: &[f32], opts: &SearchOptions<'_>, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        let query_fingerprint = query
            .iter()
            .map(|v| ((f64::from(*v) * scale).round() / scale).to_string())
            .collect::<Vec<_>>()
            .join(",");

        let filter_fingerprint = match &opts.filter {
            None => "none".to_string(),
            Some(FilterPredicate::Condition(f)) => serde_json::to_string(f).unwrap_or_else(|_| "condition:unserializable".to_string()),
            Some(FilterPredicate::Fn(_)) => "fn".to_string(),
        };

        let partition_set = match &opts.partition_ids {
            Some(ids) => {
                let mut sorted = ids.clone();
                sorted.sort();
                sorted.join(",")
            }
            None => "*".to_string(),
        };

        Self {
            query_fingerprint,
            k: opts.k,
            metric: opts.distance_metric.map(DistanceMetricTag::from),
            filter_fingerprint,
            partition_set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_identical_queries_share_a_key() {
        let opts = SearchOptions::default();
        let a = CacheKey::build(&[0.100_000_1, 0.2], &opts, 4);
        let b = CacheKey::build(&[0.100_000_2, 0.2], &opts, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn different_k_is_a_different_key() {
        let opts_a = SearchOptions { k: 5, ..Default::default() };
        let opts_b = SearchOptions { k: 10, ..Default::default() };
        let a = CacheKey::build(&[0.1, 0.2], &opts_a, 4);
        let b = CacheKey::build(&[0.1, 0.2], &opts_b, 4);
        assert_ne!(a, b);
    }
}
