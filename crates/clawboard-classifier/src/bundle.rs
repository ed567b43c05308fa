//! Bundle detection: the contiguous slice of conversation turns sharing
//! one user intent.
//!
//! Rules:
//! - a bundle is one user-intent turn plus the assistant turns that answer
//!   it;
//! - consecutive user turns before any assistant reply merge into the same
//!   bundle;
//! - anchoring on an affirmation or an assistant turn backtracks to the
//!   prior intent-bearing user turn;
//! - a new user intent after an assistant reply starts the next bundle.

use clawboard_types::{sanitize_log_text, LogEntry};

use crate::heuristics::is_affirmation;

/// Whether a turn was authored by the user side of the conversation.
pub fn is_user_turn(entry: &LogEntry) -> bool {
    let id = entry.agent_id.as_deref().unwrap_or("").to_lowercase();
    let label = entry.agent_label.as_deref().unwrap_or("").to_lowercase();
    id == "user" || label == "user"
}

fn turn_text(entry: &LogEntry) -> String {
    sanitize_log_text(
        entry
            .summary
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&entry.content),
    )
}

/// Compute the `[start, end)` bundle range around the anchor turn.
pub fn bundle_range(conversations: &[LogEntry], anchor: usize) -> (usize, usize) {
    if conversations.is_empty() {
        return (0, 0);
    }
    let anchor = anchor.min(conversations.len() - 1);

    // Backtrack to the user turn that carries the intent.
    let mut start = anchor;
    let anchored_on_user = is_user_turn(&conversations[anchor]);
    let needs_backtrack =
        !anchored_on_user || is_affirmation(&turn_text(&conversations[anchor]));
    if needs_backtrack {
        let mut index = anchor;
        while index > 0 {
            index -= 1;
            let entry = &conversations[index];
            if is_user_turn(entry) && !is_affirmation(&turn_text(entry)) {
                start = index;
                break;
            }
        }
    }
    // Consecutive user turns ahead of the intent belong to the same bundle.
    while start > 0 && is_user_turn(&conversations[start - 1]) {
        start -= 1;
    }

    // Walk forward until a fresh user intent after an assistant reply.
    let mut seen_assistant = !is_user_turn(&conversations[start]);
    let mut end = conversations.len();
    for index in (start + 1)..conversations.len() {
        let entry = &conversations[index];
        if is_user_turn(entry) {
            if seen_assistant && !is_affirmation(&turn_text(entry)) {
                end = index;
                break;
            }
        } else {
            seen_assistant = true;
        }
    }
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawboard_types::{ClassificationStatus, LogType};

    fn conv(id: &str, agent: &str, content: &str) -> LogEntry {
        LogEntry {
            id: id.into(),
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
    fn splits_on_new_user_request_after_assistant() {
        let convs = vec![
            conv("1", "user", "Explain SQLModel inserts."),
            conv("2", "assistant", "Here is how inserts work..."),
            conv("3", "user", "Now help with Docker networking."),
            conv("4", "assistant", "Docker networking basics..."),
        ];
        assert_eq!(bundle_range(&convs, 0), (0, 2));
        assert_eq!(bundle_range(&convs, 2), (2, 4));
    }

    #[test]
    fn keeps_multiple_user_turns_before_assistant() {
        let convs = vec![
            conv("1", "user", "I have two issues: A."),
            conv("2", "user", "Also B, same request."),
            conv("3", "assistant", "Got it, here's a plan..."),
            conv("4", "user", "Unrelated: new request C."),
        ];
        assert_eq!(bundle_range(&convs, 0), (0, 3));
    }

    #[test]
    fn backtracks_from_affirmation_to_prior_user_intent() {
        let convs = vec![
            conv("1", "user", "Fix the login redirect bug in NIMBUS."),
            conv("2", "assistant", "Plan: reproduce, patch, test."),
            conv("3", "user", "Yes, do it."),
            conv("4", "user", "New topic: Qdrant indexing."),
        ];
        assert_eq!(bundle_range(&convs, 2), (0, 3));
    }

    #[test]
    fn backtracks_from_assistant_to_prior_user_turn() {
        let convs = vec![
            conv("1", "user", "Please implement retries."),
            conv("2", "assistant", "Plan: exponential backoff."),
        ];
        assert_eq!(bundle_range(&convs, 1), (0, 2));
    }

    #[test]
    fn allows_assistant_only_bundle_without_prior_user() {
        let convs = vec![
            conv("1", "assistant", "System note: doing maintenance."),
            conv("2", "user", "Now a real request."),
        ];
        assert_eq!(bundle_range(&convs, 0), (0, 1));
    }
}
