//! Ingest error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload failed validation (missing type, bad reference, ...).
    #[error("invalid payload: {0}")]
    Validation(String),

    /// Referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence failure that survived the retry budget.
    #[error(transparent)]
    Store(#[from] clawboard_store::StoreError),
}
