//! Distance metrics for vector similarity calculations.
//!
//! Every metric here returns a scalar distance where lower means nearer,
//! including [`DistanceMetric::Cosine`] and [`DistanceMetric::InnerProduct`]
//! (both of which are defined as the negated/complemented form of the
//! underlying similarity so that callers never need to flip sort order
//! based on which metric is active).

use serde::{Deserialize, Serialize};

/// Distance metric for vector similarity calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance (L2 norm), `√Σ(aᵢ−bᵢ)²` over the common prefix.
    Euclidean,

    /// Squared Euclidean distance. Same ordering as `Euclidean` without the
    /// square root, cheaper when only relative order matters.
    SquaredEuclidean,

    /// Cosine distance: `1 − clamp(dot(a,b)/(‖a‖·‖b‖), −1, 1)`.
    /// Requires equal-length vectors; unequal lengths or a zero norm both
    /// return the maximal distance of `1.0`.
    Cosine,

    /// Manhattan (L1) distance over the common prefix.
    Manhattan,

    /// Chebyshev (L∞) distance over the common prefix.
    Chebyshev,

    /// Negated dot product (inner product), so smaller is "more similar" like
    /// every other metric here. Operates on the common prefix.
    InnerProduct,

    /// Hamming distance: count of differing components over the common
    /// prefix, comparing floats for exact bit equality.
    Hamming,
}

impl DistanceMetric {
    /// Calculates the distance between two vectors using this metric.
    ///
    /// Vectors of unequal length are handled per-metric: `Cosine` treats
    /// a length mismatch as maximally distant; every other metric compares
    /// only the common prefix. `gap_penalty` is an additional per-unit-gap
    /// cost folded into `Euclidean`/`SquaredEuclidean` when lengths differ
    /// (pass `0.0` to disable).
    #[must_use]
    pub fn calculate(&self, a: &[f32], b: &[f32], gap_penalty: f32) -> f32 {
        match self {
            Self::Euclidean => Self::euclidean(a, b, gap_penalty).sqrt(),
            Self::SquaredEuclidean => Self::euclidean(a, b, gap_penalty),
            Self::Cosine => Self::cosine_distance(a, b),
            Self::Manhattan => Self::manhattan(a, b),
            Self::Chebyshev => Self::chebyshev(a, b),
            Self::InnerProduct => -Self::dot(a, b),
            Self::Hamming => Self::hamming(a, b),
        }
    }

    fn euclidean(a: &[f32], b: &[f32], gap_penalty: f32) -> f32 {
        let common: f32 = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum();
        let gap = a.len().abs_diff(b.len()) as f32;
        common + gap * gap_penalty
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 1.0;
        }
        let dot = Self::dot(a, b);
        let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 1.0;
        }
        let cos_sim = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
        1.0 - cos_sim
    }

    fn manhattan(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
    }

    fn chebyshev(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0f32, f32::max)
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    fn hamming(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .filter(|(x, y)| x != y)
            .count() as f32
    }

    /// Whether higher raw similarity corresponds to *lower* distance under
    /// this metric's `calculate` convention. Always true here since every
    /// variant already returns a "lower is nearer" distance; kept for
    /// callers that want to assert the convention rather than assume it.
    #[must_use]
    pub const fn lower_is_nearer(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_matches_known_distance() {
        let a = [0.0, 0.0, 0.0];
        let b = [3.0, 4.0, 0.0];
        assert!((DistanceMetric::Euclidean.calculate(&a, &b, 0.0) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn squared_euclidean_is_euclidean_without_sqrt() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!(
            (DistanceMetric::SquaredEuclidean.calculate(&a, &b, 0.0) - 25.0).abs() < 1e-6
        );
    }

    #[test]
    fn euclidean_applies_gap_penalty_on_mismatched_length() {
        let a = [0.0, 0.0];
        let b = [0.0, 0.0, 0.0];
        let no_penalty = DistanceMetric::SquaredEuclidean.calculate(&a, &b, 0.0);
        let with_penalty = DistanceMetric::SquaredEuclidean.calculate(&a, &b, 2.0);
        assert!((no_penalty - 0.0).abs() < 1e-6);
        assert!((with_penalty - 2.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_identical_vectors_is_zero() {
        let a = [1.0, 0.0, 0.0];
        assert!(DistanceMetric::Cosine.calculate(&a, &a, 0.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_orthogonal_vectors_is_one() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        assert!((DistanceMetric::Cosine.calculate(&a, &b, 0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_mismatched_length_is_maximal() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        assert_eq!(DistanceMetric::Cosine.calculate(&a, &b, 0.0), 1.0);
    }

    #[test]
    fn cosine_distance_zero_norm_is_maximal() {
        let a = [0.0, 0.0];
        let b = [1.0, 1.0];
        assert_eq!(DistanceMetric::Cosine.calculate(&a, &b, 0.0), 1.0);
    }

    #[test]
    fn manhattan_over_common_prefix() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 0.0];
        assert!((DistanceMetric::Manhattan.calculate(&a, &b, 0.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn chebyshev_picks_max_abs_diff() {
        let a = [1.0, 5.0];
        let b = [2.0, 1.0];
        assert!((DistanceMetric::Chebyshev.calculate(&a, &b, 0.0) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn inner_product_is_negated_dot() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert!((DistanceMetric::InnerProduct.calculate(&a, &b, 0.0) + 32.0).abs() < 1e-6);
    }

    #[test]
    fn hamming_counts_differing_components() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [1.0, 0.0, 3.0, 9.0];
        assert!((DistanceMetric::Hamming.calculate(&a, &b, 0.0) - 2.0).abs() < 1e-6);
    }
}
