//! Ingest-time terminal filters.
//!
//! Control-plane chatter (cron relays, heartbeats, subagent scaffolding) and
//! tool traces must not reach the LLM classifier: they either carry no
//! routable intent or would pollute topics with operational noise. Filters
//! decide at append time; the produced status is terminal except for the
//! deferred unscoped channel case.

use clawboard_types::{ClassificationStatus, LogAppend, LogType};

/// Filter reason codes recorded in `classificationError`.
pub const FILTERED_CRON_EVENT: &str = "filtered_cron_event";
pub const FILTERED_CONTROL_PLANE: &str = "filtered_control_plane";
pub const FILTERED_SUBAGENT_SCAFFOLD: &str = "filtered_subagent_scaffold";
pub const FILTERED_TOOL_ACTIVITY: &str = "filtered_tool_activity";
pub const FILTERED_UNANCHORED_TOOL_ACTIVITY: &str = "filtered_unanchored_tool_activity";

/// Outcome of the filter pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub status: ClassificationStatus,
    pub reason: &'static str,
    /// Drop any topic/task routing carried by the payload.
    pub detach: bool,
}

fn text_of(payload: &LogAppend) -> String {
    [
        payload.content.as_deref().unwrap_or(""),
        payload.summary.as_deref().unwrap_or(""),
        payload.raw.as_deref().unwrap_or(""),
    ]
    .join("\n")
}

fn session_key(payload: &LogAppend) -> &str {
    payload
        .source
        .as_ref()
        .and_then(|s| s.session_key.as_deref())
        .unwrap_or("")
}

fn channel(payload: &LogAppend) -> &str {
    payload
        .source
        .as_ref()
        .and_then(|s| s.channel.as_deref())
        .unwrap_or("")
}

fn is_tool_trace(text: &str) -> bool {
    let lowered = text.trim_start().to_lowercase();
    lowered.starts_with("tool call:")
        || lowered.starts_with("tool result:")
        || lowered.starts_with("tool error:")
}

fn has_board_scope(payload: &LogAppend) -> bool {
    if let Some(source) = &payload.source {
        if source.board_scope_topic_id.is_some() || source.board_scope_task_id.is_some() {
            return true;
        }
    }
    session_key(payload).starts_with("clawboard:")
}

/// Evaluate the filters against an incoming payload. `None` means the
/// entry proceeds to normal pending classification.
pub fn evaluate(payload: &LogAppend) -> Option<FilterOutcome> {
    let log_type = payload.log_type?;
    let text = text_of(payload);
    let key = session_key(payload);

    match log_type {
        LogType::Conversation => {
            let lowered = text.to_lowercase();
            // Cron relays arrive on a synthetic channel (or as a System:
            // cron preamble) and carry no user intent.
            if channel(payload).eq_ignore_ascii_case("cron-event")
                || (lowered.trim_start().starts_with("system:") && lowered.contains("cron:"))
            {
                return Some(FilterOutcome {
                    status: ClassificationStatus::Failed,
                    reason: FILTERED_CRON_EVENT,
                    detach: true,
                });
            }
            // Heartbeats on the main-agent control session.
            if key.starts_with("agent:main")
                && (lowered.trim_start().starts_with("heartbeat")
                    || lowered.contains("heartbeat_ok")
                    || lowered.contains("watchdog recovery"))
            {
                return Some(FilterOutcome {
                    status: ClassificationStatus::Failed,
                    reason: FILTERED_CONTROL_PLANE,
                    detach: true,
                });
            }
            if text.trim_start().starts_with("[Subagent Context]") {
                return Some(FilterOutcome {
                    status: ClassificationStatus::Failed,
                    reason: FILTERED_SUBAGENT_SCAFFOLD,
                    detach: true,
                });
            }
            None
        }
        LogType::Action => {
            if !is_tool_trace(&text) {
                return None;
            }
            if has_board_scope(payload) {
                // Scoped tool traces keep their routing but skip the LLM.
                return Some(FilterOutcome {
                    status: ClassificationStatus::Classified,
                    reason: FILTERED_TOOL_ACTIVITY,
                    detach: false,
                });
            }
            if key.starts_with("channel:") {
                // Bundle scoping may label these later; leave pending.
                return None;
            }
            Some(FilterOutcome {
                status: ClassificationStatus::Failed,
                reason: FILTERED_UNANCHORED_TOOL_ACTIVITY,
                detach: true,
            })
        }
        _ => None,
    }
}
