//! Creation gate: decides whether a classifier-proposed new topic/task is
//! honored. Every decision is appended to a JSON-Lines audit log.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use clawboard_types::now_iso;

use crate::heuristics::{valid_task_title, GENERIC_TOPIC_NAMES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Topic,
    Task,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub allow: bool,
    pub reason: String,
}

/// Policy for create decisions. The deterministic heuristic must always be
/// available for offline runs; an LLM-backed policy can wrap it.
pub trait CreationGate: Send + Sync {
    fn decide(&self, kind: GateKind, name: &str, context: &str) -> GateDecision;
}

/// Deterministic default policy.
pub struct HeuristicGate;

impl CreationGate for HeuristicGate {
    fn decide(&self, kind: GateKind, name: &str, _context: &str) -> GateDecision {
        let trimmed = name.trim();
        if trimmed.len() < 3 {
            return GateDecision {
                allow: false,
                reason: "name too short".into(),
            };
        }
        if GENERIC_TOPIC_NAMES.contains(&trimmed.to_lowercase().as_str()) {
            return GateDecision {
                allow: false,
                reason: "generic name".into(),
            };
        }
        match kind {
            GateKind::Topic => {
                let token_count = trimmed.split_whitespace().count();
                if token_count > 6 {
                    GateDecision {
                        allow: false,
                        reason: "topic name too long".into(),
                    }
                } else {
                    GateDecision {
                        allow: true,
                        reason: "heuristic accept".into(),
                    }
                }
            }
            GateKind::Task => {
                if valid_task_title(trimmed) {
                    GateDecision {
                        allow: true,
                        reason: "heuristic accept".into(),
                    }
                } else {
                    GateDecision {
                        allow: false,
                        reason: "invalid task title".into(),
                    }
                }
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditRecord<'a> {
    ts: String,
    kind: GateKind,
    name: &'a str,
    allow: bool,
    reason: &'a str,
}

/// Append-only audit log for gate decisions.
pub struct GateAudit {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl GateAudit {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn record(&self, kind: GateKind, name: &str, decision: &GateDecision) {
        let Some(path) = &self.path else {
            return;
        };
        let _guard = self.lock.lock().unwrap();
        let record = AuditRecord {
            ts: now_iso(),
            kind,
            name,
            allow: decision.allow,
            reason: &decision.reason,
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(file, "{}", serde_json::to_string(&record).unwrap_or_default())?;
            Ok(())
        };
        if let Err(err) = write() {
            warn!(error = %err, "gate audit append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_and_short_names_are_rejected() {
        let gate = HeuristicGate;
        assert!(!gate.decide(GateKind::Topic, "general", "").allow);
        assert!(!gate.decide(GateKind::Topic, "ab", "").allow);
        assert!(gate.decide(GateKind::Topic, "Billing Migration", "").allow);
    }

    #[test]
    fn task_gate_applies_title_rules() {
        let gate = HeuristicGate;
        assert!(!gate.decide(GateKind::Task, "fix", "").allow);
        assert!(!gate.decide(GateKind::Task, "fix deadbeefdeadbeef", "").allow);
        assert!(gate.decide(GateKind::Task, "fix login redirect", "").allow);
    }

    #[test]
    fn audit_appends_jsonl_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate-audit.jsonl");
        let audit = GateAudit::new(Some(path.clone()));
        let gate = HeuristicGate;
        let decision = gate.decide(GateKind::Topic, "Billing", "");
        audit.record(GateKind::Topic, "Billing", &decision);
        audit.record(
            GateKind::Task,
            "general",
            &gate.decide(GateKind::Task, "general", ""),
        );
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["name"], "Billing");
        assert_eq!(first["allow"], true);
    }
}
