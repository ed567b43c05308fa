//! Log entries: the timeline atoms appended by chat/agent sessions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Kind of timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    Conversation,
    Action,
    Note,
    System,
    Import,
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogType::Conversation => write!(f, "conversation"),
            LogType::Action => write!(f, "action"),
            LogType::Note => write!(f, "note"),
            LogType::System => write!(f, "system"),
            LogType::Import => write!(f, "import"),
        }
    }
}

impl std::str::FromStr for LogType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation" => Ok(LogType::Conversation),
            "action" => Ok(LogType::Action),
            "note" => Ok(LogType::Note),
            "system" => Ok(LogType::System),
            "import" => Ok(LogType::Import),
            other => Err(DomainError::UnknownVariant {
                kind: "logType",
                value: other.to_string(),
            }),
        }
    }
}

/// Classifier state for a log entry.
///
/// `Failed` is terminal; the only transition back to `Pending` is the
/// administrative replay endpoint. Attempt counts never decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    Pending,
    Classified,
    Failed,
}

impl Default for ClassificationStatus {
    fn default() -> Self {
        ClassificationStatus::Pending
    }
}

impl std::fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationStatus::Pending => write!(f, "pending"),
            ClassificationStatus::Classified => write!(f, "classified"),
            ClassificationStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ClassificationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClassificationStatus::Pending),
            "classified" => Ok(ClassificationStatus::Classified),
            "failed" => Ok(ClassificationStatus::Failed),
            other => Err(DomainError::UnknownVariant {
                kind: "classificationStatus",
                value: other.to_string(),
            }),
        }
    }
}

/// Where a log came from.
///
/// Serialized as a JSON column; unknown keys from newer producers are kept
/// out of the typed model but must not fail deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Explicit board routing supplied by the producer (tool traces).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_scope_topic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_scope_task_id: Option<String>,
    /// Chat dispatch correlation id (orchestration runtime).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Orchestration item key this log resolves (`main.response`, `subagent:…`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_key: Option<String>,
    /// Forward-compat bag for producer keys the model does not know.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl LogSource {
    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref().filter(|s| !s.is_empty())
    }
}

/// Attachment metadata carried on a log entry. Blob storage is external;
/// only the descriptor travels through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub path: String,
}

/// A persisted timeline entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub space_id: String,
    pub topic_id: Option<String>,
    pub task_id: Option<String>,
    /// Curated notes link back to their source log.
    pub related_log_id: Option<String>,
    pub idempotency_key: Option<String>,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub content: String,
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default)]
    pub classification_status: ClassificationStatus,
    #[serde(default)]
    pub classification_attempts: i64,
    pub classification_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub agent_id: Option<String>,
    pub agent_label: Option<String>,
    pub source: Option<LogSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl LogEntry {
    pub fn session_key(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.session_key())
    }

    /// Payload for event fan-out: raw bodies can be large and are dropped
    /// before events reach the in-memory buffer and SSE clients.
    pub fn without_raw(&self) -> LogEntry {
        let mut entry = self.clone();
        entry.raw = None;
        entry
    }
}

/// Incoming append payload (producer-facing shape of a log entry).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogAppend {
    pub space_id: Option<String>,
    pub topic_id: Option<String>,
    pub task_id: Option<String>,
    pub related_log_id: Option<String>,
    pub idempotency_key: Option<String>,
    #[serde(rename = "type")]
    pub log_type: Option<LogType>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub raw: Option<String>,
    pub created_at: Option<String>,
    pub agent_id: Option<String>,
    pub agent_label: Option<String>,
    pub source: Option<LogSource>,
    pub attachments: Option<Vec<Attachment>>,
    /// Stage-1 capture normally leaves this unset (pending); the classifier
    /// and internal producers may override.
    pub classification_status: Option<ClassificationStatus>,
}

/// Partial update applied to an existing log entry. `None` means "leave
/// unchanged"; routing fields use a nested option so callers can null them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_status: Option<ClassificationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_attempts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_error: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_keeps_unknown_keys() {
        let json = r#"{"channel":"discord","sessionKey":"channel:general","futureField":42}"#;
        let source: LogSource = serde_json::from_str(json).unwrap();
        assert_eq!(source.channel.as_deref(), Some("discord"));
        assert_eq!(source.extra.get("futureField").unwrap(), 42);
        // Round-trip preserves the unknown key.
        let back = serde_json::to_value(&source).unwrap();
        assert_eq!(back["futureField"], 42);
    }

    #[test]
    fn without_raw_drops_only_raw() {
        let entry = LogEntry {
            id: "log-1".into(),
            space_id: "space-default".into(),
            topic_id: None,
            task_id: None,
            related_log_id: None,
            idempotency_key: Some("idem-1".into()),
            log_type: LogType::Conversation,
            content: "hello".into(),
            summary: None,
            raw: Some("User: hello".into()),
            classification_status: ClassificationStatus::Pending,
            classification_attempts: 0,
            classification_error: None,
            created_at: "2026-02-02T10:05:00.000Z".into(),
            updated_at: "2026-02-02T10:05:00.000Z".into(),
            agent_id: None,
            agent_label: None,
            source: None,
            attachments: None,
        };
        let slim = entry.without_raw();
        assert!(slim.raw.is_none());
        assert_eq!(slim.content, "hello");
        assert_eq!(slim.idempotency_key.as_deref(), Some("idem-1"));
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let patch: LogPatch = serde_json::from_str(r#"{"taskId":null}"#).unwrap();
        assert_eq!(patch.task_id, Some(None));
        assert!(patch.topic_id.is_none());
    }

    #[test]
    fn log_type_wire_name_is_type() {
        let json = r#"{"id":"log-1","spaceId":"space-default","topicId":null,"taskId":null,
            "relatedLogId":null,"idempotencyKey":null,"type":"note","content":"x",
            "summary":null,"classificationStatus":"pending","classificationAttempts":0,
            "classificationError":null,"createdAt":"2026-01-01T00:00:00.000Z",
            "updatedAt":"2026-01-01T00:00:00.000Z","agentId":null,"agentLabel":null,"source":null}"#;
        let entry: LogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.log_type, LogType::Note);
    }
}
