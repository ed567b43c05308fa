//! Canonical timestamp handling.
//!
//! Every persisted timestamp is a UTC ISO-8601 string with millisecond
//! precision and a trailing `Z`. A fixed precision keeps the strings
//! lexicographically sortable, which the store relies on for timeline and
//! change-cursor queries.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as a canonical ISO string.
pub fn now_iso() -> String {
    to_canonical(Utc::now())
}

/// Format a `DateTime<Utc>` as a canonical ISO string.
pub fn to_canonical(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize an arbitrary timestamp string to the canonical form.
///
/// Accepts offsets (`+02:00`) and naive strings (assumed UTC). Returns
/// `None` for empty or unparseable input so callers can substitute the
/// ingest time instead of persisting garbage.
pub fn normalize_iso(value: Option<&str>) -> Option<String> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(to_canonical(dt.with_timezone(&Utc)));
    }
    // Naive timestamps (no offset) are treated as UTC.
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(to_canonical(naive.and_utc()));
    }
    None
}

/// Parse a canonical ISO string back into a `DateTime<Utc>`.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
