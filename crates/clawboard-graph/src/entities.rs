//! Entity extraction from normalized log text.
//!
//! Character-class heuristics only: acronyms, CamelCase, TitleCase words,
//! and short TitleCase multi-word names, with a blocklist for timezone,
//! weekday, and month tokens.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use clawboard_types::sanitize_log_text;

const ENTITY_BLOCKLIST: &[&str] = &[
    "EST", "UTC", "GMT", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun", "January", "February",
    "March", "April", "May", "June", "July", "August", "September", "October", "November",
    "December",
];

static ACRONYM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z][A-Z0-9_-]{2,}\b").unwrap());
static CAMEL_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+(?:[A-Z][a-z0-9]+)+\b").unwrap());
static TITLE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z][a-z0-9]{2,}\b").unwrap());
static TITLE_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:\s+[A-Z][a-z0-9]+){1,2}\b").unwrap());

const MAX_ENTITY_LEN: usize = 48;

fn blocked(token: &str) -> bool {
    ENTITY_BLOCKLIST.contains(&token)
}

fn cleaned(token: &str) -> Option<String> {
    let trimmed = token.trim_matches(|c: char| "`*[](){}:;,.!?'\"".contains(c));
    if trimmed.is_empty() {
        return None;
    }
    let clipped: String = trimmed.chars().take(MAX_ENTITY_LEN).collect();
    Some(clipped.trim_end().to_string())
}

/// Extract the entity surface forms mentioned in `text`.
pub fn extract_entities(text: &str) -> HashSet<String> {
    let source = sanitize_log_text(text);
    if source.is_empty() {
        return HashSet::new();
    }

    let mut entities = HashSet::new();
    let mut collect = |token: &str| {
        if blocked(token) {
            return;
        }
        if let Some(entity) = cleaned(token) {
            entities.insert(entity);
        }
    };
    for m in ACRONYM.find_iter(&source) {
        collect(m.as_str());
    }
    for m in CAMEL_CASE.find_iter(&source) {
        collect(m.as_str());
    }
    for m in TITLE_WORD.find_iter(&source) {
        collect(m.as_str());
    }
    // Multi-word names; very short phrases are noise.
    for m in TITLE_PHRASE.find_iter(&source) {
        if m.as_str().len() >= 4 {
            collect(m.as_str());
        }
    }
    entities
}

/// Stable lowercase slug used for node ids.
pub fn slug(value: &str) -> String {
    let mut out = String::new();
    let mut last_dash = true;
    for c in value.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let out = out.trim_matches('-').to_string();
    if out.is_empty() {
        "node".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_acronyms_camelcase_and_titlecase() {
        let entities =
            extract_entities("Deploy NIMBUS via OpenClaw to the Docker Desktop cluster");
        assert!(entities.contains("NIMBUS"));
        assert!(entities.contains("OpenClaw"));
        assert!(entities.contains("Docker Desktop"));
        assert!(entities.contains("Docker"));
    }

    #[test]
    fn blocklist_drops_time_tokens() {
        let entities = extract_entities("Meet Friday at 10 EST in March");
        assert!(!entities.contains("EST"));
        assert!(!entities.contains("March"));
        assert!(!entities.contains("Fri"));
    }

    #[test]
    fn entities_are_length_capped() {
        let long = format!("{}X", "Aa".repeat(40));
        let entities = extract_entities(&long);
        for entity in entities {
            assert!(entity.chars().count() <= MAX_ENTITY_LEN);
        }
    }

    #[test]
    fn slug_is_stable_and_safe() {
        assert_eq!(slug("Docker Desktop"), "docker-desktop");
        assert_eq!(slug("  ***  "), "node");
        assert_eq!(slug("A/B test #2"), "a-b-test-2");
    }
}
