//! Vector layer error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorError {
    #[error("vector store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("remote vector service error: {0}")]
    Remote(String),

    #[error("reindex queue io error: {0}")]
    QueueIo(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] clawboard_embeddings::EmbeddingError),

    #[error("store error: {0}")]
    Store(#[from] clawboard_store::StoreError),
}

impl From<serde_json::Error> for VectorError {
    fn from(err: serde_json::Error) -> Self {
        VectorError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for VectorError {
    fn from(err: std::io::Error) -> Self {
        VectorError::QueueIo(err.to_string())
    }
}
