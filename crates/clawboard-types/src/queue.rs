//! Durable ingest queue envelopes for out-of-band log ingestion.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::log::LogAppend;

/// Processing state of a queued envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Done => write!(f, "done"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "done" => Ok(QueueStatus::Done),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(DomainError::UnknownVariant {
                kind: "queueStatus",
                value: other.to_string(),
            }),
        }
    }
}

/// One queued append awaiting the drain worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestQueueItem {
    pub id: i64,
    pub payload: LogAppend,
    pub status: QueueStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: String,
}
