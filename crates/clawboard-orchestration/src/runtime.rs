//! Run/item state transitions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use clawboard_store::{orchestration as orch, Store, StoreError};
use clawboard_types::{
    create_id, now_iso, subagent_item_key, time, LogEntry, LogType, OrchestrationItem,
    OrchestrationRun, OrchestrationStatus, MAIN_RESPONSE_KEY,
};

#[derive(Debug, Clone)]
pub struct OrchestrationConfig {
    /// Delay before an item is re-examined.
    pub check_interval: Duration,
    /// Inactivity span after which a running item is marked stalled.
    pub stall_after: Duration,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(20),
            stall_after: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub items_checked: usize,
    pub items_stalled: usize,
    pub runs_completed: usize,
}

pub struct OrchestrationRuntime {
    store: Arc<Store>,
    config: OrchestrationConfig,
}

impl OrchestrationRuntime {
    pub fn new(store: Arc<Store>, config: OrchestrationConfig) -> Self {
        Self { store, config }
    }

    fn next_check(&self) -> String {
        let when = chrono::Utc::now()
            + chrono::Duration::from_std(self.config.check_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(20));
        time::to_canonical(when)
    }

    /// Record a chat dispatch: one run keyed by request id with its
    /// `main.response` item. Duplicate dispatches return the existing run.
    pub fn record_dispatch(
        &self,
        request_id: &str,
        session_key: &str,
    ) -> Result<OrchestrationRun, StoreError> {
        if let Some(existing) = self
            .store
            .read(|conn| orch::get_run_by_request(conn, request_id))?
        {
            return Ok(existing);
        }
        let now = now_iso();
        let run = OrchestrationRun {
            id: create_id("run"),
            request_id: request_id.to_string(),
            session_key: session_key.to_string(),
            status: OrchestrationStatus::Running,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        let item = OrchestrationItem {
            id: create_id("orchitem"),
            run_id: run.id.clone(),
            item_key: MAIN_RESPONSE_KEY.to_string(),
            status: OrchestrationStatus::Running,
            attempts: 0,
            next_check_at: Some(self.next_check()),
            last_activity_at: Some(now.clone()),
            meta: serde_json::json!({ "sessionKey": session_key }),
        };
        let result = self.store.write(|conn| {
            orch::insert_run(conn, &run)?;
            orch::upsert_item(conn, &item)?;
            Ok(())
        });
        match result {
            Ok(()) => {
                info!(request_id, "recorded orchestration run");
                Ok(run)
            }
            Err(err) if err.is_duplicate() => {
                // Lost the race to another dispatcher; the stored run wins.
                self.store
                    .read(|conn| orch::get_run_by_request(conn, request_id))?
                    .ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Observe an ingested log and advance any matching run items.
    pub fn observe_log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        let Some(source) = &entry.source else {
            return Ok(());
        };
        let Some(request_id) = source.request_id.as_deref().filter(|r| !r.is_empty()) else {
            return Ok(());
        };
        let Some(run) = self
            .store
            .read(|conn| orch::get_run_by_request(conn, request_id))?
        else {
            return Ok(());
        };
        if run.status != OrchestrationStatus::Running {
            return Ok(());
        }

        // Successful spawn results derive a subagent item.
        if entry.log_type == LogType::Action {
            if let Some(child) = spawned_child_session(entry) {
                let item = OrchestrationItem {
                    id: create_id("orchitem"),
                    run_id: run.id.clone(),
                    item_key: subagent_item_key(&child),
                    status: OrchestrationStatus::Running,
                    attempts: 0,
                    next_check_at: Some(self.next_check()),
                    last_activity_at: Some(entry.created_at.clone()),
                    meta: serde_json::json!({ "childSessionKey": child }),
                };
                let added = self.store.write(|conn| orch::upsert_item(conn, &item))?;
                if added {
                    debug!(request_id, item_key = %item.item_key, "discovered subagent item");
                }
            }
        }

        // Item-addressed logs mark activity; assistant replies complete.
        let item_key = source
            .item_key
            .clone()
            .or_else(|| entry_item_key(entry, &run));
        if let Some(item_key) = item_key {
            let now = now_iso();
            let completes = entry.log_type == LogType::Conversation && !is_user_entry(entry);
            self.store.write(|conn| {
                let items = orch::items_for_run(conn, &run.id)?;
                for mut item in items {
                    if item.item_key != item_key
                        || item.status != OrchestrationStatus::Running
                    {
                        continue;
                    }
                    item.last_activity_at = Some(entry.created_at.clone());
                    if completes {
                        item.status = OrchestrationStatus::Done;
                    }
                    orch::update_item(conn, &item)?;
                }
                self.settle_run(conn, &run.id, &now)?;
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Promote items whose check time has passed; stall silent ones.
    pub fn tick(&self) -> Result<TickReport, StoreError> {
        let now = now_iso();
        let due = self.store.read(|conn| orch::due_items(conn, &now))?;
        let mut report = TickReport::default();
        for mut item in due {
            report.items_checked += 1;
            item.attempts += 1;
            let inactive = item
                .last_activity_at
                .as_deref()
                .and_then(time::parse_iso)
                .map(|ts| chrono::Utc::now().signed_duration_since(ts))
                .map(|d| d.to_std().unwrap_or_default())
                .unwrap_or(self.config.stall_after);
            if inactive >= self.config.stall_after {
                item.status = OrchestrationStatus::Stalled;
                item.next_check_at = None;
                report.items_stalled += 1;
                warn!(item_key = %item.item_key, "orchestration item stalled");
            } else {
                item.next_check_at = Some(self.next_check());
            }
            let run_id = item.run_id.clone();
            self.store.write(|conn| {
                orch::update_item(conn, &item)?;
                Ok(())
            })?;
            if self.store.write(|conn| self.settle_run(conn, &run_id, &now))? {
                report.runs_completed += 1;
            }
        }
        Ok(report)
    }

    /// Cancellation propagates to every item.
    pub fn cancel(&self, request_id: &str) -> Result<bool, StoreError> {
        let Some(run) = self
            .store
            .read(|conn| orch::get_run_by_request(conn, request_id))?
        else {
            return Ok(false);
        };
        let now = now_iso();
        self.store.write(|conn| {
            orch::set_run_status(conn, &run.id, OrchestrationStatus::Cancelled, &now)?;
            for mut item in orch::items_for_run(conn, &run.id)? {
                if matches!(
                    item.status,
                    OrchestrationStatus::Running | OrchestrationStatus::Stalled
                ) {
                    item.status = OrchestrationStatus::Cancelled;
                    item.next_check_at = None;
                    orch::update_item(conn, &item)?;
                }
            }
            Ok(())
        })?;
        info!(request_id, "cancelled orchestration run");
        Ok(true)
    }

    pub fn run_status(&self, request_id: &str) -> Result<Option<(OrchestrationRun, Vec<OrchestrationItem>)>, StoreError> {
        self.store.read(|conn| {
            let Some(run) = orch::get_run_by_request(conn, request_id)? else {
                return Ok(None);
            };
            let items = orch::items_for_run(conn, &run.id)?;
            Ok(Some((run, items)))
        })
    }

    /// A run is complete only when `main.response` and every subagent item
    /// are done. Returns whether the run transitioned.
    fn settle_run(
        &self,
        conn: &rusqlite::Connection,
        run_id: &str,
        now: &str,
    ) -> Result<bool, StoreError> {
        let items = orch::items_for_run(conn, run_id)?;
        if items.is_empty() {
            return Ok(false);
        }
        if items.iter().all(|i| i.status == OrchestrationStatus::Done) {
            orch::set_run_status(conn, run_id, OrchestrationStatus::Done, now)?;
            return Ok(true);
        }
        Ok(false)
    }
}

fn is_user_entry(entry: &LogEntry) -> bool {
    let id = entry.agent_id.as_deref().unwrap_or("").to_lowercase();
    let label = entry.agent_label.as_deref().unwrap_or("").to_lowercase();
    id == "user" || label == "user"
}

/// Item key for a log that is not explicitly addressed: assistant replies
/// on the run's own session resolve `main.response`; logs on a child
/// session resolve its subagent item.
fn entry_item_key(entry: &LogEntry, run: &OrchestrationRun) -> Option<String> {
    let session = entry.session_key()?;
    if session == run.session_key {
        return Some(MAIN_RESPONSE_KEY.to_string());
    }
    Some(subagent_item_key(session))
}

/// Parse a `sessions_spawn` tool result. Error results do not create items.
fn spawned_child_session(entry: &LogEntry) -> Option<String> {
    let raw = entry.raw.as_deref()?;
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if value.get("toolName").and_then(|v| v.as_str()) != Some("sessions_spawn") {
        return None;
    }
    let result = value.get("result")?;
    if result.get("status").and_then(|v| v.as_str()) == Some("error")
        || result.get("error").is_some()
    {
        return None;
    }
    result
        .get("childSessionKey")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawboard_types::{ClassificationStatus, LogSource};

    fn runtime() -> OrchestrationRuntime {
        OrchestrationRuntime::new(
            Arc::new(Store::open_in_memory().unwrap()),
            OrchestrationConfig::default(),
        )
    }

    fn log(
        log_type: LogType,
        agent: &str,
        session: &str,
        request_id: &str,
        raw: Option<&str>,
    ) -> LogEntry {
        LogEntry {
            id: create_id("log"),
            space_id: "space-default".into(),
            topic_id: None,
            task_id: None,
            related_log_id: None,
            idempotency_key: None,
            log_type,
            content: "x".into(),
            summary: None,
            raw: raw.map(|r| r.to_string()),
            classification_status: ClassificationStatus::Pending,
            classification_attempts: 0,
            classification_error: None,
            created_at: now_iso(),
            updated_at: now_iso(),
            agent_id: Some(agent.into()),
            agent_label: None,
            source: Some(LogSource {
                session_key: Some(session.into()),
                request_id: Some(request_id.into()),
                ..Default::default()
            }),
            attachments: None,
        }
    }

    #[test]
    fn dispatch_creates_run_with_main_item() {
        let runtime = runtime();
        let run = runtime.record_dispatch("req-1", "agent:main:main").unwrap();
        let (loaded, items) = runtime.run_status("req-1").unwrap().unwrap();
        assert_eq!(loaded.id, run.id);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_key, MAIN_RESPONSE_KEY);
        assert!(items[0].next_check_at.is_some());
        // Duplicate dispatch returns the same run.
        let again = runtime.record_dispatch("req-1", "agent:main:main").unwrap();
        assert_eq!(again.id, run.id);
    }

    #[test]
    fn successful_spawn_creates_subagent_item_once() {
        let runtime = runtime();
        runtime.record_dispatch("req-2", "agent:main:main").unwrap();
        let spawn = log(
            LogType::Action,
            "assistant",
            "agent:main:main",
            "req-2",
            Some(r#"{"toolName":"sessions_spawn","result":{"childSessionKey":"agent:coding:subagent:c1"}}"#),
        );
        runtime.observe_log(&spawn).unwrap();
        runtime.observe_log(&spawn).unwrap();
        let (_, items) = runtime.run_status("req-2").unwrap().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items
            .iter()
            .any(|i| i.item_key == "subagent:agent:coding:subagent:c1"));
    }

    #[test]
    fn error_spawn_results_do_not_create_items() {
        let runtime = runtime();
        runtime.record_dispatch("req-3", "agent:main:main").unwrap();
        let spawn = log(
            LogType::Action,
            "assistant",
            "agent:main:main",
            "req-3",
            Some(r#"{"toolName":"sessions_spawn","result":{"status":"error","childSessionKey":"agent:coding:subagent:c2"}}"#),
        );
        runtime.observe_log(&spawn).unwrap();
        let (_, items) = runtime.run_status("req-3").unwrap().unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn run_completes_only_when_all_items_done() {
        let runtime = runtime();
        runtime.record_dispatch("req-4", "agent:main:main").unwrap();
        let spawn = log(
            LogType::Action,
            "assistant",
            "agent:main:main",
            "req-4",
            Some(r#"{"toolName":"sessions_spawn","result":{"childSessionKey":"agent:coding:subagent:c3"}}"#),
        );
        runtime.observe_log(&spawn).unwrap();

        // Main assistant reply closes main.response but not the run.
        let main_reply = log(
            LogType::Conversation,
            "assistant",
            "agent:main:main",
            "req-4",
            None,
        );
        runtime.observe_log(&main_reply).unwrap();
        let (run, items) = runtime.run_status("req-4").unwrap().unwrap();
        assert_eq!(run.status, OrchestrationStatus::Running);
        let main = items.iter().find(|i| i.item_key == MAIN_RESPONSE_KEY).unwrap();
        assert_eq!(main.status, OrchestrationStatus::Done);

        // Subagent reply completes the run.
        let child_reply = log(
            LogType::Conversation,
            "assistant",
            "agent:coding:subagent:c3",
            "req-4",
            None,
        );
        runtime.observe_log(&child_reply).unwrap();
        let (run, _) = runtime.run_status("req-4").unwrap().unwrap();
        assert_eq!(run.status, OrchestrationStatus::Done);
    }

    #[test]
    fn cancel_propagates_to_items() {
        let runtime = runtime();
        runtime.record_dispatch("req-5", "agent:main:main").unwrap();
        assert!(runtime.cancel("req-5").unwrap());
        let (run, items) = runtime.run_status("req-5").unwrap().unwrap();
        assert_eq!(run.status, OrchestrationStatus::Cancelled);
        assert!(items
            .iter()
            .all(|i| i.status == OrchestrationStatus::Cancelled));
        assert!(!runtime.cancel("req-unknown").unwrap());
    }

    #[test]
    fn tick_stalls_silent_items() {
        let runtime = OrchestrationRuntime::new(
            Arc::new(Store::open_in_memory().unwrap()),
            OrchestrationConfig {
                check_interval: Duration::from_secs(20),
                stall_after: Duration::from_secs(0),
            },
        );
        runtime.record_dispatch("req-6", "agent:main:main").unwrap();
        // Force the item due now.
        runtime
            .store
            .write(|conn| {
                conn.execute(
                    "UPDATE orchestration_item SET next_check_at = '2020-01-01T00:00:00.000Z'",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let report = runtime.tick().unwrap();
        assert_eq!(report.items_checked, 1);
        assert_eq!(report.items_stalled, 1);
        let (_, items) = runtime.run_status("req-6").unwrap().unwrap();
        assert_eq!(items[0].status, OrchestrationStatus::Stalled);
    }
}
