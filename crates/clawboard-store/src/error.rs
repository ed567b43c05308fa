//! Store layer error types.

use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A uniqueness constraint was violated. Callers resolve idempotency
    /// conflicts by re-reading the existing row instead of retrying.
    #[error("duplicate row: {0}")]
    Duplicate(String),

    /// The write retry budget was exhausted while the database stayed busy.
    #[error("database busy after {attempts} attempts")]
    Busy { attempts: u32 },

    /// Row not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// JSON column (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl StoreError {
    /// Whether this error is a transient lock that the retry wrapper
    /// should absorb.
    pub fn is_busy(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            StoreError::Busy { .. } => true,
            _ => false,
        }
    }

    /// Whether this error is a uniqueness violation.
    pub fn is_duplicate(&self) -> bool {
        match self {
            StoreError::Duplicate(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
