//! Task: an optional sub-workstream of a topic.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::topic::{CreatedBy, Priority};

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Doing,
    Blocked,
    Done,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Todo
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::Doing => write!(f, "doing"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            other => Err(DomainError::UnknownVariant {
                kind: "taskStatus",
                value: other.to_string(),
            }),
        }
    }
}

/// A task inside (or awaiting assignment to) a topic.
///
/// A task implies its topic: whenever a log references a task, the log's
/// `topic_id` must equal the task's `topic_id`. The ingest service enforces
/// this at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub space_id: String,
    pub topic_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub created_by: CreatedBy,
    #[serde(default)]
    pub sort_index: i64,
    pub color: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub snoozed_until: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    pub digest: Option<String>,
    pub digest_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Doing).unwrap(),
            "\"doing\""
        );
    }

    #[test]
    fn task_serializes_camel_case_fields() {
        let task = Task {
            id: "task-1".into(),
            space_id: "space-default".into(),
            topic_id: Some("topic-1".into()),
            title: "Ship onboarding wizard".into(),
            created_by: CreatedBy::Classifier,
            sort_index: 0,
            color: None,
            status: TaskStatus::Doing,
            priority: Some(Priority::High),
            due_date: None,
            snoozed_until: None,
            tags: vec![],
            pinned: false,
            digest: None,
            digest_updated_at: None,
            created_at: "2026-02-02T10:00:00.000Z".into(),
            updated_at: "2026-02-02T10:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["topicId"], "topic-1");
        assert_eq!(json["spaceId"], "space-default");
        assert_eq!(json["createdBy"], "classifier");
    }
}
