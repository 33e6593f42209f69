//! Exact brute-force search backend.
//!
//! Computes cosine similarity against every candidate directly. Slower than
//! the ANN backend but bit-reproducible, and always available.

/// Cosine similarity between two vectors; zero-magnitude inputs score 0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Rank every stored vector against `query`, best first.
///
/// Ties break on the candidate's position so that identical inputs always
/// produce identical orderings.
pub(crate) fn rank_all(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(position, vector)| (position, cosine_similarity(vector, query)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn ranking_is_descending_and_truncated() {
        let vectors = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.5, 0.5],
        ];
        let ranked = rank_all(&vectors, &[1.0, 0.0], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, 1);
        assert_eq!(ranked[1].0, 2);
        assert!(ranked[0].1 >= ranked[1].1);
    }

    #[test]
    fn ties_break_on_position() {
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        let ranked = rank_all(&vectors, &[1.0, 0.0], 3);
        assert_eq!(
            ranked.iter().map(|(pos, _)| *pos).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
