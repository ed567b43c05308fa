//! Query/candidate text normalization and lexical scoring.

use std::collections::HashSet;

use clawboard_types::sanitize_log_text;

/// Tokens too common to carry signal.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "about", "where", "what", "when",
    "have", "has", "been", "were", "is", "are", "to", "of", "on", "in", "a", "an",
];

/// Lowercase alphanumeric tokens, at least three chars, stop-words removed.
pub fn token_set(value: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let mut current = String::new();
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            current.push(c.to_ascii_lowercase());
        } else if !current.is_empty() {
            push_token(&mut tokens, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_token(&mut tokens, current);
    }
    tokens
}

fn push_token(tokens: &mut HashSet<String>, token: String) {
    if token.len() > 2 && !STOP_WORDS.contains(&token.as_str()) {
        tokens.insert(token);
    }
}

/// Normalize a query or candidate body: producer framing stripped,
/// whitespace collapsed.
pub fn normalize(value: &str) -> String {
    sanitize_log_text(value)
}

/// Jaccard similarity over token sets.
pub fn lexical_similarity(query: &str, text: &str) -> f32 {
    let a = token_set(query);
    let b = token_set(text);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(&b).count();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    inter as f32 / union as f32
}

/// Whether a candidate's session key matches the caller's, either exactly
/// or at a `:`-separated boundary (base-key continuity).
pub fn session_matches(candidate: &str, caller: &str) -> bool {
    if candidate.is_empty() || caller.is_empty() {
        return false;
    }
    candidate == caller
        || candidate.starts_with(&format!("{caller}:"))
        || caller.starts_with(&format!("{candidate}:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_filter_short_and_stop_words() {
        let tokens = token_set("Fix the login redirect in AUTH-7 now");
        assert!(tokens.contains("fix"));
        assert!(tokens.contains("login"));
        assert!(tokens.contains("redirect"));
        assert!(tokens.contains("auth"));
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("in"));
        assert!(!tokens.contains("7"));
    }

    #[test]
    fn jaccard_is_symmetric_and_bounded() {
        let a = "deploy billing service";
        let b = "billing service deploy checklist";
        let score = lexical_similarity(a, b);
        assert!(score > 0.0 && score <= 1.0);
        assert_eq!(score, lexical_similarity(b, a));
        assert_eq!(lexical_similarity(a, "unrelated entirely different"), 0.0);
    }

    #[test]
    fn session_matching_accepts_base_keys() {
        assert!(session_matches("channel:discord:42", "channel:discord:42"));
        assert!(session_matches("channel:discord:42:thread-9", "channel:discord:42"));
        assert!(session_matches("channel:discord:42", "channel:discord:42:thread-9"));
        assert!(!session_matches("channel:discord:42", "channel:slack:42"));
        assert!(!session_matches("", "channel:discord:42"));
    }
}
