//! Embedding model seam.
//!
//! The embedding model is an external collaborator: the store only needs a
//! deterministic `encode` producing fixed-length vectors. The crate ships a
//! character n-gram feature-hashing embedder good enough to place
//! misspellings of a value near the value itself; heavier models plug in
//! behind the same trait.

use crate::error::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Encodes text into fixed-length vectors. Must be deterministic for
/// identical input.
pub trait EmbeddingModel: Send + Sync {
    /// Encodes `text` into a vector of `dimension()` floats.
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector produced by `encode`.
    fn dimension(&self) -> usize;
}

/// Character bigram/trigram feature-hashing embedder.
///
/// Lowercases the input, surrounds it with boundary markers, hashes each
/// bigram and trigram into a bucket, and L2-normalizes the counts. Strings
/// sharing most of their character n-grams (typos, case differences) end up
/// with high cosine similarity.
#[derive(Debug, Clone)]
pub struct NgramEmbedder {
    dimension: usize,
}

impl NgramEmbedder {
    /// Creates an embedder producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for NgramEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingModel for NgramEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        // Boundary markers so prefixes and suffixes carry weight.
        let chars: Vec<char> = std::iter::once('\u{2}')
            .chain(text.to_lowercase().chars())
            .chain(std::iter::once('\u{3}'))
            .collect();

        for n in [2usize, 3] {
            if chars.len() < n {
                continue;
            }
            for window in chars.windows(n) {
                let mut hasher = DefaultHasher::new();
                window.hash(&mut hasher);
                let bucket = (hasher.finish() % self.dimension as u64) as usize;
                vector[bucket] += 1.0;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity between two vectors; 0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_deterministic() {
        let embedder = NgramEmbedder::default();
        let a = embedder.encode("shipped").unwrap();
        let b = embedder.encode("shipped").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_is_normalized() {
        let embedder = NgramEmbedder::default();
        let v = embedder.encode("pending").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_encode_dimension() {
        let embedder = NgramEmbedder::new(64);
        assert_eq!(embedder.encode("x").unwrap().len(), 64);
        assert_eq!(embedder.dimension(), 64);
    }

    #[test]
    fn test_case_insensitive() {
        let embedder = NgramEmbedder::default();
        let a = embedder.encode("Shipped").unwrap();
        let b = embedder.encode("shipped").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_typo_scores_higher_than_unrelated() {
        let embedder = NgramEmbedder::default();
        let shipped = embedder.encode("shipped").unwrap();
        let typo = embedder.encode("shiped").unwrap();
        let unrelated = embedder.encode("cancelled").unwrap();

        let typo_score = cosine_similarity(&typo, &shipped);
        let unrelated_score = cosine_similarity(&unrelated, &shipped);

        assert!(typo_score > 0.8, "typo similarity was {typo_score}");
        assert!(typo_score > unrelated_score);
    }

    #[test]
    fn test_cosine_identity_and_zero() {
        let a = vec![1.0, 0.0, 2.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }
}
