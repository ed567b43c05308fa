//! Helpers for JSON-typed TEXT columns and enum TEXT columns.
//!
//! Unknown or corrupt column values fall back to defaults instead of
//! failing the whole row read; forward-compat producers may have written
//! values this build does not know yet.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Deserialize an optional JSON column, defaulting on NULL or parse failure.
pub fn from_json<T: DeserializeOwned + Default>(value: Option<String>) -> T {
    value
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

/// Deserialize an optional JSON column into `Option<T>`.
pub fn from_json_opt<T: DeserializeOwned>(value: Option<String>) -> Option<T> {
    value.and_then(|text| serde_json::from_str(&text).ok())
}

/// Serialize a value for storage in a JSON column.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Parse an enum TEXT column, defaulting on unknown values.
pub fn parse_enum<T: std::str::FromStr + Default>(value: String) -> T {
    value.parse().unwrap_or_default()
}

/// Parse an optional enum TEXT column; unknown values become `None`.
pub fn parse_enum_opt<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}
