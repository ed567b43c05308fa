//! Deterministic hashing embedder for offline runs and tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{EmbeddingError, EmbeddingProvider};

/// Bag-of-words embedder: each token hashes to a handful of dimensions.
///
/// Similar texts share tokens and therefore directions, which is enough for
/// retrieval plumbing to behave realistically without a model runtime.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| t.len() > 2)
        {
            let digest = Sha256::digest(token.as_bytes());
            for chunk in digest.chunks_exact(4).take(4) {
                let value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let index = (value as usize) % self.dimension;
                let sign = if value & 1 == 0 { 1.0 } else { -1.0 };
                vector[index] += sign;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosine_similarity;

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("deploy the billing service").await.unwrap();
        let b = embedder.embed("deploy the billing service").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn overlapping_text_is_closer_than_disjoint() {
        let embedder = HashingEmbedder::new(128);
        let base = embedder.embed("fix login redirect bug").await.unwrap();
        let near = embedder.embed("login redirect still broken").await.unwrap();
        let far = embedder.embed("quarterly revenue forecast").await.unwrap();
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(32);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
