//! # clawboard-embeddings
//!
//! The embedding capability consumed by the vector index and classifier.
//!
//! The provider itself is external; this crate defines the contract plus
//! two implementations: an HTTP client for OpenAI-compatible embedding
//! endpoints and a deterministic hashing embedder for offline runs and
//! tests. A read-through cache wrapper bounds repeat lookups.

mod cache;
mod http;
mod mock;

pub use cache::CachedEmbedder;
pub use http::{HttpEmbedder, HttpEmbedderConfig};
pub use mock::HashingEmbedder;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from embedding lookups.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding response malformed: {0}")]
    Malformed(String),

    #[error("embedding provider unavailable")]
    Unavailable,

    #[error("invalid embedder configuration: {0}")]
    Config(String),
}

/// Pluggable text embedding capability.
///
/// Vectors are fixed-dimension `f32`; cosine similarity is the metric
/// everywhere downstream, so providers should return unit-comparable
/// magnitudes (the local scan normalizes defensively anyway).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector dimension this provider produces.
    fn dimension(&self) -> usize;
}

/// Cosine similarity between two vectors, 0.0 when either is degenerate.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
