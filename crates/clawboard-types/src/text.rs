//! Text sanitization shared by ingest, search, and the graph builder.
//!
//! Producers prepend channel headers, message-id tags, and `Summary:`
//! prefixes that pollute retrieval and entity extraction; everything that
//! feeds an index strips them through here.

use std::sync::LazyLock;

use regex::Regex;

use crate::log::{LogEntry, LogType};

static SUMMARY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*summary\s*[:\-]\s*").unwrap());
static CHANNEL_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\[Discord [^\]]+\]\s*").unwrap());
static MESSAGE_ID_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[message[_\s-]?id:[^\]]+\]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SLASH_COMMAND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/[a-z0-9_-]{2,}$").unwrap());
static MEMORY_TOOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bmemory[_-]?(search|get|query|fetch|retrieve|read|write|store|list|prune|delete)\b")
        .unwrap()
});

/// Slash commands recognized as board controls rather than content.
const SLASH_COMMANDS: &[&str] = &[
    "/new", "/topic", "/topics", "/task", "/tasks", "/log", "/logs", "/board", "/graph", "/help",
    "/reset", "/clear",
];

/// Strip producer framing and collapse whitespace.
pub fn sanitize_log_text(value: &str) -> String {
    let text = value.replace("\r\n", "\n").replace('\r', "\n");
    let text = SUMMARY_PREFIX.replace_all(text.trim(), "");
    let text = CHANNEL_HEADER.replace_all(&text, "");
    let text = MESSAGE_ID_TAG.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Clip to `limit` chars, appending an ellipsis when truncated.
pub fn clip(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let kept: String = value.chars().take(limit.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

/// Whether a conversation log is a board slash command.
pub fn is_command_log(entry: &LogEntry) -> bool {
    if entry.log_type != LogType::Conversation {
        return false;
    }
    let text = sanitize_log_text(first_text(entry));
    let Some(command) = text.split_whitespace().next() else {
        return false;
    };
    if !command.starts_with('/') {
        return false;
    }
    let command = command.to_lowercase();
    SLASH_COMMANDS.contains(&command.as_str()) || SLASH_COMMAND.is_match(&command)
}

/// Whether an action log is a memory-tool trace (read/write against the
/// agent's own memory, not board content).
pub fn is_memory_action_log(entry: &LogEntry) -> bool {
    if entry.log_type != LogType::Action {
        return false;
    }
    let combined = combined_text(entry).to_lowercase();
    (combined.contains("tool call:")
        || combined.contains("tool result:")
        || combined.contains("tool error:"))
        && MEMORY_TOOL.is_match(&combined)
}

fn first_text(entry: &LogEntry) -> &str {
    if !entry.content.is_empty() {
        &entry.content
    } else if let Some(summary) = entry.summary.as_deref() {
        summary
    } else {
        entry.raw.as_deref().unwrap_or("")
    }
}

fn combined_text(entry: &LogEntry) -> String {
    [
        entry.summary.as_deref().unwrap_or(""),
        &entry.content,
        entry.raw.as_deref().unwrap_or(""),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .cloned()
    .collect::<Vec<_>>()
    .join(" ")
}

/// The text a log contributes to the vector index, or `None` when the entry
/// is non-indexable (system/import rows, slash commands, memory traces).
pub fn log_index_text(entry: &LogEntry) -> Option<String> {
    if matches!(entry.log_type, LogType::System | LogType::Import) {
        return None;
    }
    if is_memory_action_log(entry) || is_command_log(entry) {
        return None;
    }
    let parts = [
        sanitize_log_text(entry.summary.as_deref().unwrap_or("")),
        sanitize_log_text(&entry.content),
        sanitize_log_text(entry.raw.as_deref().unwrap_or("")),
    ];
    let text = parts
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return None;
    }
    Some(clip(&text, 1200))
}
