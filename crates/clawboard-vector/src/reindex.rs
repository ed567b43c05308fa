//! Append-only reindex queue (JSON-Lines).
//!
//! Ingest and the API append intents here; the maintenance job drains them,
//! coalescing by `(kind, id)` so a backlogged queue applies only the newest
//! intent per point. At-least-once: a crash between drain and apply re-runs
//! the batch, which is safe because upserts and deletes are idempotent.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use clawboard_types::now_iso;

use crate::error::VectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexOp {
    Upsert,
    Delete,
}

/// One queued intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexRequest {
    pub op: ReindexOp,
    /// `topic`, `task`, or `log`.
    pub kind: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub requested_at: String,
}

impl ReindexRequest {
    pub fn upsert(kind: &str, id: &str, text: String, topic_id: Option<String>) -> Self {
        Self {
            op: ReindexOp::Upsert,
            kind: kind.to_string(),
            id: id.to_string(),
            topic_id,
            text: Some(text),
            requested_at: now_iso(),
        }
    }

    pub fn delete(kind: &str, id: &str) -> Self {
        Self {
            op: ReindexOp::Delete,
            kind: kind.to_string(),
            id: id.to_string(),
            topic_id: None,
            text: None,
            requested_at: now_iso(),
        }
    }

    /// The index kind namespace this request targets.
    pub fn index_kind(&self) -> String {
        match (self.kind.as_str(), &self.topic_id) {
            ("task", Some(topic_id)) => format!("task:{topic_id}"),
            _ => self.kind.clone(),
        }
    }
}

pub struct ReindexQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReindexQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Append one intent. Failures are surfaced but callers treat them as
    /// best-effort: the maintenance reconcile repairs missed intents.
    pub fn enqueue(&self, request: &ReindexRequest) -> Result<(), VectorError> {
        let _guard = self.lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(request)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read every queued intent without consuming the file.
    pub fn read_all(&self) -> Result<Vec<ReindexRequest>, VectorError> {
        let _guard = self.lock.lock().unwrap();
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut requests = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(request) => requests.push(request),
                Err(err) => warn!(error = %err, "skipping malformed reindex line"),
            }
        }
        Ok(requests)
    }

    /// Drain all intents, coalesced by `(kind, id)` keeping the newest.
    pub fn drain_coalesced(&self) -> Result<Vec<ReindexRequest>, VectorError> {
        let requests = self.read_all()?;
        {
            let _guard = self.lock.lock().unwrap();
            if !requests.is_empty() {
                std::fs::write(&self.path, b"")?;
            }
        }
        Ok(coalesce(requests))
    }
}

/// Keep only the newest intent per `(kind, id)`, preserving arrival order
/// of the survivors.
pub fn coalesce(requests: Vec<ReindexRequest>) -> Vec<ReindexRequest> {
    let mut newest: HashMap<(String, String), usize> = HashMap::new();
    for (index, request) in requests.iter().enumerate() {
        newest.insert((request.kind.clone(), request.id.clone()), index);
    }
    requests
        .into_iter()
        .enumerate()
        .filter(|(index, request)| {
            newest.get(&(request.kind.clone(), request.id.clone())) == Some(index)
        })
        .map(|(_, request)| request)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReindexQueue::new(dir.path().join("reindex.jsonl"));
        queue
            .enqueue(&ReindexRequest::upsert("topic", "t1", "Infra".into(), None))
            .unwrap();
        queue.enqueue(&ReindexRequest::delete("log", "l1")).unwrap();
        let all = queue.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].op, ReindexOp::Upsert);
        assert_eq!(all[1].op, ReindexOp::Delete);
    }

    #[test]
    fn coalesce_keeps_newest_per_point() {
        let requests = vec![
            ReindexRequest::upsert("log", "l1", "old text".into(), None),
            ReindexRequest::upsert("log", "l2", "other".into(), None),
            ReindexRequest::delete("log", "l1"),
        ];
        let coalesced = coalesce(requests);
        assert_eq!(coalesced.len(), 2);
        let l1 = coalesced.iter().find(|r| r.id == "l1").unwrap();
        assert_eq!(l1.op, ReindexOp::Delete);
    }

    #[test]
    fn drain_empties_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReindexQueue::new(dir.path().join("reindex.jsonl"));
        queue
            .enqueue(&ReindexRequest::upsert("topic", "t1", "x".into(), None))
            .unwrap();
        assert_eq!(queue.drain_coalesced().unwrap().len(), 1);
        assert!(queue.read_all().unwrap().is_empty());
    }

    #[test]
    fn task_requests_carry_topic_scoped_kind() {
        let request = ReindexRequest::upsert("task", "k1", "title".into(), Some("topic-9".into()));
        assert_eq!(request.index_kind(), "task:topic-9");
        assert_eq!(ReindexRequest::delete("log", "l1").index_kind(), "log");
    }
}
