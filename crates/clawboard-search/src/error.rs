//! Search error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("reranker failed: {0}")]
    Rerank(String),

    #[error("vector lookup failed: {0}")]
    Vector(#[from] clawboard_vector::VectorError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] clawboard_embeddings::EmbeddingError),
}
