//! Deterministic text heuristics: affirmations, small talk, low-signal
//! turns, derived names, and title validation.

use std::sync::LazyLock;

use regex::Regex;

use clawboard_types::{sanitize_log_text, LogEntry};

use crate::bundle::is_user_turn;

/// Topic names too generic to create.
pub const GENERIC_TOPIC_NAMES: &[&str] = &[
    "general", "misc", "miscellaneous", "other", "random", "stuff", "chat", "notes", "todo",
    "todos", "tasks", "work", "updates", "conversation", "discussion",
];

/// Words that on their own confirm rather than introduce intent.
const AFFIRMATION_WORDS: &[&str] = &[
    "yes", "yep", "yeah", "yup", "ok", "okay", "sure", "sounds", "good", "great", "perfect",
    "please", "do", "it", "go", "ahead", "thanks", "thank", "you", "confirmed", "correct",
    "right", "exactly", "proceed", "continue",
];

const GREETING_WORDS: &[&str] = &[
    "hi", "hello", "hey", "howdy", "morning", "afternoon", "evening", "thanks", "thank", "you",
    "lol", "haha", "bye", "goodnight", "welcome", "how", "are", "what's", "whats", "up", "good",
];

static TASK_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(fix|implement|build|add|create|deploy|ship|write|refactor|investigate|debug|update|migrate|set up|setup|configure|review|test|release|design|draft|rename|remove|delete|upgrade)\b",
    )
    .unwrap()
});

static HASH_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9a-fA-F]{8,}|[A-Za-z0-9]{16,})$").unwrap());

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// "Yes, do it." is an affirmation; "Yes, but not yet." is not.
pub fn is_affirmation(text: &str) -> bool {
    let words = words(text);
    if words.is_empty() || words.len() > 5 {
        return false;
    }
    words.iter().all(|w| AFFIRMATION_WORDS.contains(&w.as_str()))
}

/// Greetings and chit-chat with no actionable content.
pub fn is_small_talk_text(text: &str) -> bool {
    let words = words(text);
    if words.is_empty() || words.len() > 8 {
        return false;
    }
    if TASK_INTENT.is_match(text) {
        return false;
    }
    let greeting_hits = words
        .iter()
        .filter(|w| GREETING_WORDS.contains(&w.as_str()) || AFFIRMATION_WORDS.contains(&w.as_str()))
        .count();
    greeting_hits * 2 >= words.len()
}

/// A turn too thin to route on its own; continuity falls back to routing
/// memory.
pub fn is_low_signal(text: &str) -> bool {
    let words = words(text);
    words.len() <= 2 || is_affirmation(text) || is_small_talk_text(text)
}

fn user_texts(window: &[LogEntry]) -> Vec<String> {
    window
        .iter()
        .filter(|e| is_user_turn(e))
        .map(|e| sanitize_log_text(&e.content))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whether the whole window is small talk.
pub fn window_is_small_talk(window: &[LogEntry]) -> bool {
    let texts = user_texts(window);
    !texts.is_empty() && texts.iter().all(|t| is_small_talk_text(t))
}

/// Whether any user turn expresses something task-shaped.
pub fn window_has_task_intent(window: &[LogEntry]) -> bool {
    user_texts(window).iter().any(|t| TASK_INTENT.is_match(t))
}

/// Capitalized words that are sentence framing, not entities.
const ENTITY_COMMON_WORDS: &[&str] = &[
    "please", "the", "this", "that", "now", "also", "hello", "thanks", "can", "could", "would",
    "should", "what", "when", "where", "how", "why", "let", "lets", "it's", "its", "here",
    "there", "yes", "okay",
];

/// Derive a topic name from the window: prefer salient acronym/CamelCase
/// entities from user turns, then mid-sentence TitleCase words, then the
/// leading significant words.
pub fn derive_topic_name(window: &[LogEntry]) -> String {
    static STRONG_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b([A-Z][A-Z0-9_-]{2,}|[A-Z][a-z]+(?:[A-Z][a-z0-9]+)+)\b").unwrap()
    });
    static TITLE_WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b([A-Z][a-z0-9]{2,}(?:\s+[A-Z][a-z0-9]{2,})?)\b").unwrap());

    let texts = user_texts(window);
    let usable = |candidate: &str, offset: usize| {
        candidate.len() >= 3
            && offset > 0
            && !GENERIC_TOPIC_NAMES.contains(&candidate.to_lowercase().as_str())
            && !ENTITY_COMMON_WORDS.contains(&candidate.to_lowercase().as_str())
    };
    for text in &texts {
        for capture in STRONG_ENTITY.captures_iter(text) {
            let candidate = capture[1].trim();
            // Acronyms and CamelCase are entities wherever they appear.
            if usable(candidate, 1) {
                return candidate.to_string();
            }
        }
    }
    for text in &texts {
        for capture in TITLE_WORD.captures_iter(text) {
            let m = capture.get(1).unwrap();
            // Sentence-initial capitalization is framing, not a name.
            if usable(m.as_str().trim(), m.start()) {
                return m.as_str().trim().to_string();
            }
        }
    }
    for text in &texts {
        let significant: Vec<String> = words(text)
            .into_iter()
            .filter(|w| w.len() > 3 && !GENERIC_TOPIC_NAMES.contains(&w.as_str()))
            .take(3)
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => w,
                }
            })
            .collect();
        if !significant.is_empty() {
            return significant.join(" ");
        }
    }
    "General".to_string()
}

/// Derive a task title when a user turn carries actionable intent.
pub fn derive_task_title(window: &[LogEntry]) -> Option<String> {
    for text in user_texts(window) {
        if !TASK_INTENT.is_match(&text) {
            continue;
        }
        let title: Vec<&str> = text.split_whitespace().take(9).collect();
        let title = title.join(" ");
        let title = title.trim_end_matches(['.', '!', '?', ',']).to_string();
        if valid_task_title(&title) {
            return Some(title);
        }
    }
    None
}

/// Guardrail: 2–12 tokens, no hash-like tokens, not a generic word.
pub fn valid_task_title(title: &str) -> bool {
    let tokens: Vec<&str> = title.split_whitespace().collect();
    if tokens.len() < 2 || tokens.len() > 12 {
        return false;
    }
    if tokens.iter().any(|t| HASH_LIKE.is_match(t)) {
        return false;
    }
    let lowered = title.to_lowercase();
    !GENERIC_TOPIC_NAMES.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawboard_types::{ClassificationStatus, LogType};

    fn turn(agent: &str, content: &str) -> LogEntry {
        LogEntry {
            id: "log-x".into(),
            space_id: "space-default".into(),
            topic_id: None,
            task_id: None,
            related_log_id: None,
            idempotency_key: None,
            log_type: LogType::Conversation,
            content: content.into(),
            summary: None,
            raw: None,
            classification_status: ClassificationStatus::Pending,
            classification_attempts: 0,
            classification_error: None,
            created_at: "2026-02-10T09:00:00.000Z".into(),
            updated_at: "2026-02-10T09:00:00.000Z".into(),
            agent_id: Some(agent.into()),
            agent_label: None,
            source: None,
            attachments: None,
        }
    }

    #[test]
    fn affirmation_handles_punctuation() {
        assert!(is_affirmation("Yes, do it."));
        assert!(is_affirmation("Okay!"));
        assert!(!is_affirmation("Yes, but not yet."));
        assert!(!is_affirmation("Fix the login bug"));
    }

    #[test]
    fn small_talk_window_has_no_task_intent() {
        let window = vec![turn("user", "hey, how are you?"), turn("assistant", "Doing great!")];
        assert!(window_is_small_talk(&window));
        assert!(!window_has_task_intent(&window));
        assert!(derive_task_title(&window).is_none());
    }

    #[test]
    fn task_oriented_window_detects_intent_and_title() {
        let window = vec![
            turn("user", "Please implement retry logic for the billing webhook."),
            turn("assistant", "Plan: exponential backoff."),
        ];
        assert!(window_has_task_intent(&window));
        let title = derive_task_title(&window).unwrap();
        assert!(valid_task_title(&title));
        assert!(title.to_lowercase().contains("implement"));
    }

    #[test]
    fn derived_topic_prefers_named_entities() {
        let window = vec![turn("user", "the NIMBUS deploy keeps failing on startup")];
        assert_eq!(derive_topic_name(&window), "NIMBUS");
    }

    #[test]
    fn derived_topic_never_returns_generic_for_topical_text() {
        let window = vec![turn("user", "let's plan the quarterly budget review cycle")];
        let name = derive_topic_name(&window);
        assert!(!GENERIC_TOPIC_NAMES.contains(&name.to_lowercase().as_str()));
        assert_ne!(name, "General");
    }

    #[test]
    fn title_validation_rejects_hashes_and_generic_words() {
        assert!(!valid_task_title("fix deadbeefdeadbeef"));
        assert!(!valid_task_title("general"));
        assert!(!valid_task_title("fix"));
        assert!(valid_task_title("fix login redirect"));
        let long = (0..13).map(|_| "word").collect::<Vec<_>>().join(" ");
        assert!(!valid_task_title(&long));
    }

    #[test]
    fn low_signal_covers_single_words_and_greetings() {
        assert!(is_low_signal("thanks"));
        assert!(is_low_signal("yes"));
        assert!(is_low_signal("sounds good"));
        assert!(!is_low_signal("the deploy pipeline is broken again"));
    }
}
