//! Domain-level validation errors shared across crates.

use thiserror::Error;

/// Errors raised while validating or normalizing domain values.
#[derive(Error, Debug)]
pub enum DomainError {
    /// A field failed validation (name, human-readable reason).
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// An enum string did not match any known variant.
    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

impl DomainError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
