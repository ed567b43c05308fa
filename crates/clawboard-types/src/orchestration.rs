//! Orchestration runs: tracking multi-agent chat dispatches to completion.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Item key for the primary assistant response of a run.
pub const MAIN_RESPONSE_KEY: &str = "main.response";

/// Item key for a discovered subagent session.
pub fn subagent_item_key(child_session_key: &str) -> String {
    format!("subagent:{child_session_key}")
}

/// Lifecycle of a run or one of its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Running,
    Done,
    Stalled,
    Cancelled,
}

impl std::fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestrationStatus::Running => write!(f, "running"),
            OrchestrationStatus::Done => write!(f, "done"),
            OrchestrationStatus::Stalled => write!(f, "stalled"),
            OrchestrationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for OrchestrationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(OrchestrationStatus::Running),
            "done" => Ok(OrchestrationStatus::Done),
            "stalled" => Ok(OrchestrationStatus::Stalled),
            "cancelled" => Ok(OrchestrationStatus::Cancelled),
            other => Err(DomainError::UnknownVariant {
                kind: "orchestrationStatus",
                value: other.to_string(),
            }),
        }
    }
}

/// One run per chat dispatch, keyed by the gateway request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRun {
    pub id: String,
    pub request_id: String,
    pub session_key: String,
    pub status: OrchestrationStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// A tracked unit of work within a run (`main.response` or one subagent).
///
/// `item_key` is stable per run, so duplicate spawn discoveries collapse
/// into the existing item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationItem {
    pub id: String,
    pub run_id: String,
    pub item_key: String,
    pub status: OrchestrationStatus,
    pub attempts: i64,
    pub next_check_at: Option<String>,
    pub last_activity_at: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subagent_keys_are_stable() {
        let key = subagent_item_key("agent:coding:subagent:child-1");
        assert_eq!(key, "subagent:agent:coding:subagent:child-1");
        assert_eq!(key, subagent_item_key("agent:coding:subagent:child-1"));
    }
}
