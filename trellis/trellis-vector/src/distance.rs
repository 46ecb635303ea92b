//! Scoring functions and the raw-distance conversion table.

use std::cmp::Ordering;
use trellis_core::{IndexDistance, VectorSearchMetric};

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity in [-1, 1]; zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot_product(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Bounded transform of Euclidean distance into (0, 1].
pub fn euclidean_similarity(a: &[f32], b: &[f32]) -> f32 {
    1.0 / (1.0 + euclidean_distance(a, b))
}

/// Score `candidate` against `query` under `metric`. Returns `None` when
/// the lengths differ.
pub fn score(metric: VectorSearchMetric, query: &[f32], candidate: &[f32]) -> Option<f32> {
    if query.len() != candidate.len() {
        return None;
    }
    Some(match metric {
        VectorSearchMetric::CosineDistance => cosine_distance(query, candidate),
        VectorSearchMetric::CosineSimilarity => cosine_similarity(query, candidate),
        VectorSearchMetric::EuclideanDistance => euclidean_distance(query, candidate),
        VectorSearchMetric::EuclideanSimilarity => euclidean_similarity(query, candidate),
        VectorSearchMetric::DotProduct => dot_product(query, candidate),
    })
}

/// Distance the approximate index is built on. Smaller is closer for every
/// variant; dot product is negated to fit that convention.
pub fn raw_distance(distance: IndexDistance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        IndexDistance::Cosine => cosine_distance(a, b),
        IndexDistance::Euclidean => euclidean_distance(a, b),
        IndexDistance::DotProduct => -dot_product(a, b),
    }
}

/// Convert a raw index distance into `metric`'s convention. `None` means
/// the pairing has no closed form and the vector must be re-scored.
pub fn convert(distance: IndexDistance, metric: VectorSearchMetric, raw: f32) -> Option<f32> {
    use IndexDistance as D;
    use VectorSearchMetric as M;
    match (distance, metric) {
        (D::Cosine, M::CosineDistance) => Some(raw),
        (D::Cosine, M::CosineSimilarity) => Some(1.0 - raw),
        (D::Euclidean, M::EuclideanDistance) => Some(raw),
        (D::Euclidean, M::EuclideanSimilarity) => Some(1.0 / (1.0 + raw)),
        (D::DotProduct, M::DotProduct) => Some(-raw),
        _ => None,
    }
}

/// Result ordering for `metric`: ascending for distances, descending
/// otherwise.
pub fn rank(metric: VectorSearchMetric, a: f32, b: f32) -> Ordering {
    if metric.is_distance() {
        a.total_cmp(&b)
    } else {
        b.total_cmp(&a)
    }
}
