//! Classifier error types.
//!
//! Timeouts and malformed model output are ordinary values here, not
//! panics: the worker ladder (repair, fallback, per-session isolation)
//! branches on them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("llm request timed out")]
    LlmTimeout,

    #[error("llm request failed: {0}")]
    Llm(String),

    #[error("llm response failed validation: {0}")]
    InvalidResponse(String),

    #[error("classifier lock held by another instance")]
    LockHeld,

    #[error(transparent)]
    Store(#[from] clawboard_store::StoreError),

    #[error(transparent)]
    Ingest(#[from] clawboard_ingest::IngestError),

    #[error("lock io error: {0}")]
    LockIo(String),
}

impl From<std::io::Error> for ClassifierError {
    fn from(err: std::io::Error) -> Self {
        ClassifierError::LockIo(err.to_string())
    }
}
