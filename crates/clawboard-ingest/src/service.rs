//! The ingest service: validated, idempotent, filter-aware log writes.
//!
//! This service is the only writer of log rows; the API, the queue drain
//! worker, and the classifier all funnel through it. Snooze revival and
//! reindex publication are best-effort side effects and never fail the
//! write.

use std::sync::Arc;

use tracing::{debug, info, warn};

use clawboard_events::{BoardEvent, EventHub};
use clawboard_store::{logs, tasks, topics, spaces, Store, StoreError};
use clawboard_types::{
    create_id, log_index_text, normalize_iso, now_iso, ClassificationStatus, LogAppend, LogEntry,
    LogPatch, LogType, TopicStatus,
};
use clawboard_vector::{ReindexQueue, ReindexRequest};

use crate::error::IngestError;
use crate::filters;
use crate::idempotency::resolve_key;

pub struct IngestService {
    store: Arc<Store>,
    hub: Arc<EventHub>,
    reindex: Arc<ReindexQueue>,
}

impl IngestService {
    pub fn new(store: Arc<Store>, hub: Arc<EventHub>, reindex: Arc<ReindexQueue>) -> Self {
        Self { store, hub, reindex }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn reindex_queue(&self) -> &Arc<ReindexQueue> {
        &self.reindex
    }

    /// Append a log entry. Retried appends with the same idempotency key
    /// return the originally stored row unchanged.
    pub fn append(
        &self,
        payload: LogAppend,
        header_key: Option<&str>,
    ) -> Result<LogEntry, IngestError> {
        let log_type = payload
            .log_type
            .ok_or_else(|| IngestError::Validation("type is required".into()))?;
        if log_type == LogType::Note && payload.related_log_id.is_none() {
            return Err(IngestError::Validation(
                "note entries require relatedLogId".into(),
            ));
        }

        let created_at = normalize_iso(payload.created_at.as_deref()).unwrap_or_else(now_iso);
        // Ingest time for updatedAt keeps ordering stable even when a
        // producer supplies identical or low-precision createdAt values.
        let updated_at = now_iso();

        let idempotency_key = resolve_key(&payload, header_key);
        if let Some(key) = &idempotency_key {
            if let Some(existing) = self.store.read(|conn| logs::find_by_idempotency(conn, key))? {
                debug!(log_id = %existing.id, "idempotent append, returning existing row");
                return Ok(existing);
            }
        } else if let Some(source) = &payload.source {
            // Rows written before key synthesis existed carry no key; match
            // keyless conversation retries on the source message identity.
            if let Some(message_id) = source.message_id.as_deref().filter(|m| !m.trim().is_empty())
            {
                if log_type == LogType::Conversation {
                    let existing = self.store.read(|conn| {
                        logs::find_by_source_message(
                            conn,
                            log_type,
                            payload.agent_id.as_deref(),
                            message_id.trim(),
                            source.channel.as_deref(),
                        )
                    })?;
                    if let Some(existing) = existing {
                        return Ok(existing);
                    }
                }
            }
        }

        let filter_outcome = filters::evaluate(&payload);

        let entry = self.store.write(|conn| {
            // Routing validation inside the write session so the referenced
            // rows cannot vanish between check and insert.
            let mut topic_id = payload.topic_id.clone().filter(|t| !t.is_empty());
            let mut task_id = payload.task_id.clone().filter(|t| !t.is_empty());

            let task_row = match &task_id {
                Some(id) => tasks::get(conn, id)?,
                None => None,
            };
            if task_id.is_some() && task_row.is_none() {
                task_id = None;
            }
            if let Some(task) = &task_row {
                // A task implies its topic.
                topic_id = task.topic_id.clone();
            } else if let Some(id) = &topic_id {
                if topics::get(conn, id)?.is_none() {
                    topic_id = None;
                }
            }

            let mut space_id = payload
                .space_id
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| clawboard_types::space::DEFAULT_SPACE_ID.to_string());
            if spaces::get(conn, &space_id)?.is_none() {
                space_id = clawboard_types::space::DEFAULT_SPACE_ID.to_string();
            }

            let mut classification_status = payload
                .classification_status
                .unwrap_or(ClassificationStatus::Pending);
            let mut classification_error = None;
            if let Some(outcome) = &filter_outcome {
                classification_status = outcome.status;
                classification_error = Some(outcome.reason.to_string());
                if outcome.detach {
                    topic_id = None;
                    task_id = None;
                } else if topic_id.is_none() && task_id.is_none() {
                    // Scoped tool traces adopt their anchor as routing.
                    let (scoped_topic, scoped_task) = anchored_scope(&payload);
                    if let Some(candidate) = scoped_task {
                        if let Some(task) = tasks::get(conn, &candidate)? {
                            topic_id = task.topic_id.clone();
                            task_id = Some(task.id);
                        }
                    }
                    if task_id.is_none() {
                        if let Some(candidate) = scoped_topic {
                            if topics::get(conn, &candidate)?.is_some() {
                                topic_id = Some(candidate);
                            }
                        }
                    }
                }
            }

            let entry = LogEntry {
                id: create_id("log"),
                space_id,
                topic_id,
                task_id,
                related_log_id: payload.related_log_id.clone(),
                idempotency_key: idempotency_key.clone(),
                log_type,
                content: payload.content.clone().unwrap_or_default(),
                summary: payload.summary.clone(),
                raw: payload.raw.clone(),
                classification_status,
                classification_attempts: 0,
                classification_error,
                created_at: created_at.clone(),
                updated_at: updated_at.clone(),
                agent_id: payload.agent_id.clone(),
                agent_label: payload.agent_label.clone(),
                source: payload.source.clone(),
                attachments: payload.attachments.clone(),
            };
            logs::insert(conn, &entry)?;
            Ok(entry)
        });

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.is_duplicate() => {
                // Another writer committed the same key while we were in
                // flight; resolve as an idempotent return.
                if let Some(key) = &idempotency_key {
                    if let Some(existing) =
                        self.store.read(|conn| logs::find_by_idempotency(conn, key))?
                    {
                        return Ok(existing);
                    }
                }
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        self.revive_snoozed(entry.topic_id.as_deref(), entry.task_id.as_deref());
        self.publish_log_event("log.appended", &entry);
        self.enqueue_log_reindex(&entry);
        info!(log_id = %entry.id, log_type = %entry.log_type, "appended log entry");
        Ok(entry)
    }

    /// Apply a partial update. Task routing wins over topic routing when
    /// both are supplied and disagree.
    pub fn patch(&self, log_id: &str, patch: LogPatch) -> Result<LogEntry, IngestError> {
        let entry = self.store.write(|conn| {
            let Some(mut entry) = logs::get(conn, log_id)? else {
                return Err(StoreError::NotFound(log_id.to_string()));
            };

            // Resolve routing first.
            let requested_task = patch.task_id.clone();
            let requested_topic = patch.topic_id.clone();

            match (&requested_topic, &requested_task) {
                (_, Some(Some(task_id))) => {
                    match tasks::get(conn, task_id)? {
                        Some(task) => {
                            entry.task_id = Some(task.id.clone());
                            entry.topic_id = task.topic_id.clone();
                        }
                        None => {
                            entry.task_id = None;
                            if let Some(Some(topic_id)) = &requested_topic {
                                entry.topic_id =
                                    topics::get(conn, topic_id)?.map(|t| t.id);
                            }
                        }
                    }
                }
                (Some(Some(topic_id)), None) => {
                    let resolved = topics::get(conn, topic_id)?.map(|t| t.id);
                    entry.topic_id = resolved.clone();
                    // Keep the task only if it still belongs to the new topic.
                    if let Some(task_id) = entry.task_id.clone() {
                        let keep = match tasks::get(conn, &task_id)? {
                            Some(task) => task.topic_id == resolved && resolved.is_some(),
                            None => false,
                        };
                        if !keep {
                            entry.task_id = None;
                        }
                    }
                }
                (Some(None), None) => {
                    entry.topic_id = None;
                    entry.task_id = None;
                }
                (_, Some(None)) => {
                    entry.task_id = None;
                    match &requested_topic {
                        Some(Some(topic_id)) => {
                            entry.topic_id = topics::get(conn, topic_id)?.map(|t| t.id);
                        }
                        Some(None) => entry.topic_id = None,
                        None => {}
                    }
                }
                (None, None) => {}
            }

            if let Some(content) = patch.content.clone() {
                entry.content = content;
            }
            if let Some(summary) = patch.summary.clone() {
                entry.summary = Some(summary);
            }
            if let Some(status) = patch.classification_status {
                entry.classification_status = status;
            }
            if let Some(attempts) = patch.classification_attempts {
                // Attempt counts never decrease.
                entry.classification_attempts = entry.classification_attempts.max(attempts);
            }
            if let Some(error) = patch.classification_error.clone() {
                entry.classification_error = error;
            }
            entry.updated_at = now_iso();
            logs::update(conn, &entry)?;
            Ok(entry)
        })?;

        self.revive_snoozed(entry.topic_id.as_deref(), entry.task_id.as_deref());
        self.publish_log_event("log.patched", &entry);
        self.enqueue_log_reindex(&entry);
        Ok(entry)
    }

    /// Delete a log and its curated notes. Returns every removed id.
    pub fn delete(&self, log_id: &str) -> Result<Vec<String>, IngestError> {
        let removed = self
            .store
            .write(|conn| logs::delete_with_notes(conn, log_id))?;
        if removed.is_empty() {
            return Err(IngestError::NotFound(log_id.to_string()));
        }
        let now = now_iso();
        for id in &removed {
            self.hub.publish(
                BoardEvent::new("log.deleted", serde_json::json!({ "id": id })).with_ts(now.clone()),
            );
            if let Err(err) = self.reindex.enqueue(&ReindexRequest::delete("log", id)) {
                warn!(log_id = %id, error = %err, "reindex delete enqueue failed");
            }
        }
        Ok(removed)
    }

    /// Clear snooze state on rows that just saw activity. Never fails the
    /// surrounding write.
    fn revive_snoozed(&self, topic_id: Option<&str>, task_id: Option<&str>) {
        if topic_id.is_none() && task_id.is_none() {
            return;
        }
        let now = now_iso();
        let result: Result<Vec<BoardEvent>, StoreError> = self.store.write(|conn| {
            let mut events = Vec::new();
            if let Some(topic_id) = topic_id {
                if let Some(mut topic) = topics::get(conn, topic_id)? {
                    if topic.snoozed_until.is_some() || topic.status == TopicStatus::Snoozed {
                        topic.snoozed_until = None;
                        if topic.status == TopicStatus::Snoozed {
                            topic.status = TopicStatus::Active;
                        }
                        topic.updated_at = now.clone();
                        topics::update(conn, &topic)?;
                        events.push(
                            BoardEvent::new(
                                "topic.upserted",
                                serde_json::to_value(&topic).unwrap_or_default(),
                            )
                            .with_ts(topic.updated_at.clone()),
                        );
                    }
                }
            }
            if let Some(task_id) = task_id {
                if let Some(mut task) = tasks::get(conn, task_id)? {
                    if task.snoozed_until.is_some() {
                        task.snoozed_until = None;
                        task.updated_at = now.clone();
                        tasks::update(conn, &task)?;
                        events.push(
                            BoardEvent::new(
                                "task.upserted",
                                serde_json::to_value(&task).unwrap_or_default(),
                            )
                            .with_ts(task.updated_at.clone()),
                        );
                    }
                }
            }
            Ok(events)
        });
        match result {
            Ok(events) => {
                for event in events {
                    self.hub.publish(event);
                }
            }
            Err(err) => warn!(error = %err, "snooze revival failed"),
        }
    }

    fn publish_log_event(&self, event_type: &str, entry: &LogEntry) {
        // Raw payloads can be large; keep events lightweight for the SSE
        // buffer.
        let data = serde_json::to_value(entry.without_raw()).unwrap_or_default();
        self.hub
            .publish(BoardEvent::new(event_type, data).with_ts(entry.updated_at.clone()));
    }

    fn enqueue_log_reindex(&self, entry: &LogEntry) {
        let request = match log_index_text(entry) {
            Some(text) => ReindexRequest::upsert("log", &entry.id, text, entry.topic_id.clone()),
            None => ReindexRequest::delete("log", &entry.id),
        };
        if let Err(err) = self.reindex.enqueue(&request) {
            warn!(log_id = %entry.id, error = %err, "reindex enqueue failed");
        }
    }
}

/// Explicit board routing carried by a payload: the source's board scope
/// fields, else a `clawboard:topic:…` / `clawboard:task:…` session key.
fn anchored_scope(payload: &LogAppend) -> (Option<String>, Option<String>) {
    if let Some(source) = &payload.source {
        if source.board_scope_topic_id.is_some() || source.board_scope_task_id.is_some() {
            return (
                source.board_scope_topic_id.clone(),
                source.board_scope_task_id.clone(),
            );
        }
        if let Some(session_key) = source.session_key() {
            let parts: Vec<&str> = session_key.split(':').collect();
            match parts.as_slice() {
                ["clawboard", "topic", topic_id] => {
                    return (Some((*topic_id).to_string()), None)
                }
                ["clawboard", "task", topic_id, task_id] => {
                    return (
                        Some((*topic_id).to_string()),
                        Some((*task_id).to_string()),
                    )
                }
                _ => {}
            }
        }
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawboard_types::{LogSource, Priority, Task, TaskStatus, Topic};
    use clawboard_types::{CreatedBy, ClassificationStatus};

    fn service() -> (IngestService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let hub = Arc::new(EventHub::new(100, None));
        let reindex = Arc::new(ReindexQueue::new(dir.path().join("reindex.jsonl")));
        (IngestService::new(store, hub, reindex), dir)
    }

    fn seed_topic(service: &IngestService, id: &str, name: &str) -> Topic {
        let now = now_iso();
        let topic = Topic {
            id: id.into(),
            space_id: "space-default".into(),
            name: name.into(),
            created_by: CreatedBy::User,
            sort_index: 0,
            color: None,
            description: None,
            priority: Some(Priority::Medium),
            status: TopicStatus::Active,
            snoozed_until: None,
            tags: vec![],
            parent_id: None,
            pinned: false,
            digest: None,
            digest_updated_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        service
            .store
            .write(|conn| topics::insert(conn, &topic))
            .unwrap();
        topic
    }

    fn seed_task(service: &IngestService, id: &str, topic_id: &str) -> Task {
        let now = now_iso();
        let task = Task {
            id: id.into(),
            space_id: "space-default".into(),
            topic_id: Some(topic_id.into()),
            title: "Ship it".into(),
            created_by: CreatedBy::User,
            sort_index: 0,
            color: None,
            status: TaskStatus::Todo,
            priority: None,
            due_date: None,
            snoozed_until: None,
            tags: vec![],
            pinned: false,
            digest: None,
            digest_updated_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        service
            .store
            .write(|conn| tasks::insert(conn, &task))
            .unwrap();
        task
    }

    fn conversation(content: &str) -> LogAppend {
        LogAppend {
            log_type: Some(LogType::Conversation),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    #[test]
    fn append_twice_with_same_key_returns_same_row() {
        let (service, _dir) = service();
        let mut payload = conversation("hello");
        payload.source = Some(LogSource {
            channel: Some("discord".into()),
            message_id: Some("m1".into()),
            ..Default::default()
        });
        let first = service.append(payload.clone(), Some("idem-1")).unwrap();
        let second = service.append(payload, Some("idem-1")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.idempotency_key.as_deref(), Some("idem-1"));
    }

    #[test]
    fn task_implies_topic_overrides_payload_topic() {
        let (service, _dir) = service();
        seed_topic(&service, "topic-a", "A");
        seed_topic(&service, "topic-b", "B");
        seed_task(&service, "task-t", "topic-a");

        let mut payload = conversation("work on the task");
        payload.topic_id = Some("topic-b".into());
        payload.task_id = Some("task-t".into());
        let entry = service.append(payload, None).unwrap();
        assert_eq!(entry.topic_id.as_deref(), Some("topic-a"));
        assert_eq!(entry.task_id.as_deref(), Some("task-t"));
    }

    #[test]
    fn unknown_topic_reference_is_dropped() {
        let (service, _dir) = service();
        let mut payload = conversation("hello");
        payload.topic_id = Some("topic-ghost".into());
        let entry = service.append(payload, None).unwrap();
        assert!(entry.topic_id.is_none());
    }

    #[test]
    fn note_requires_related_log() {
        let (service, _dir) = service();
        let mut payload = conversation("a note");
        payload.log_type = Some(LogType::Note);
        assert!(matches!(
            service.append(payload, None),
            Err(IngestError::Validation(_))
        ));
    }

    #[test]
    fn append_revives_snoozed_topic() {
        let (service, _dir) = service();
        let mut topic = seed_topic(&service, "topic-z", "Zzz");
        topic.status = TopicStatus::Snoozed;
        topic.snoozed_until = Some("2099-01-01T00:00:00.000Z".into());
        service
            .store
            .write(|conn| topics::update(conn, &topic))
            .unwrap();

        let mut payload = conversation("wake up");
        payload.topic_id = Some("topic-z".into());
        service.append(payload, None).unwrap();

        let revived = service
            .store
            .read(|conn| topics::get(conn, "topic-z"))
            .unwrap()
            .unwrap();
        assert_eq!(revived.status, TopicStatus::Active);
        assert!(revived.snoozed_until.is_none());
    }

    #[test]
    fn filtered_cron_event_is_terminal_and_detached() {
        let (service, _dir) = service();
        seed_topic(&service, "topic-a", "A");
        let mut payload = conversation("System: [cron] Cron: backup ran.");
        payload.topic_id = Some("topic-a".into());
        payload.source = Some(LogSource {
            channel: Some("cron-event".into()),
            session_key: Some("agent:main:main".into()),
            ..Default::default()
        });
        let entry = service.append(payload, None).unwrap();
        assert_eq!(entry.classification_status, ClassificationStatus::Failed);
        assert_eq!(
            entry.classification_error.as_deref(),
            Some("filtered_cron_event")
        );
        assert!(entry.topic_id.is_none());
    }

    #[test]
    fn scoped_tool_trace_adopts_its_anchor() {
        let (service, _dir) = service();
        seed_topic(&service, "topic-a", "A");
        seed_task(&service, "task-t", "topic-a");
        let mut payload = LogAppend {
            log_type: Some(LogType::Action),
            content: Some("Tool result: shell.exec".into()),
            ..Default::default()
        };
        payload.source = Some(LogSource {
            channel: Some("openclaw".into()),
            session_key: Some("clawboard:task:topic-a:task-t".into()),
            ..Default::default()
        });
        let entry = service.append(payload, None).unwrap();
        assert_eq!(entry.classification_status, ClassificationStatus::Classified);
        assert_eq!(
            entry.classification_error.as_deref(),
            Some("filtered_tool_activity")
        );
        assert_eq!(entry.topic_id.as_deref(), Some("topic-a"));
        assert_eq!(entry.task_id.as_deref(), Some("task-t"));
    }

    #[test]
    fn patch_task_wins_over_topic() {
        let (service, _dir) = service();
        seed_topic(&service, "topic-a", "A");
        seed_topic(&service, "topic-b", "B");
        seed_task(&service, "task-t", "topic-a");
        let entry = service.append(conversation("hello"), None).unwrap();

        let patched = service
            .patch(
                &entry.id,
                LogPatch {
                    topic_id: Some(Some("topic-b".into())),
                    task_id: Some(Some("task-t".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(patched.topic_id.as_deref(), Some("topic-a"));
        assert_eq!(patched.task_id.as_deref(), Some("task-t"));
    }

    #[test]
    fn patch_topic_clears_foreign_task() {
        let (service, _dir) = service();
        seed_topic(&service, "topic-a", "A");
        seed_topic(&service, "topic-b", "B");
        seed_task(&service, "task-t", "topic-a");

        let mut payload = conversation("hello");
        payload.task_id = Some("task-t".into());
        let entry = service.append(payload, None).unwrap();
        assert_eq!(entry.task_id.as_deref(), Some("task-t"));

        let patched = service
            .patch(
                &entry.id,
                LogPatch {
                    topic_id: Some(Some("topic-b".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(patched.topic_id.as_deref(), Some("topic-b"));
        assert!(patched.task_id.is_none());
    }

    #[test]
    fn patch_never_decreases_attempts() {
        let (service, _dir) = service();
        let entry = service.append(conversation("hello"), None).unwrap();
        let patched = service
            .patch(
                &entry.id,
                LogPatch {
                    classification_attempts: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(patched.classification_attempts, 3);
        let patched = service
            .patch(
                &entry.id,
                LogPatch {
                    classification_attempts: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(patched.classification_attempts, 3);
    }

    #[test]
    fn delete_cascades_notes_and_reports_ids() {
        let (service, _dir) = service();
        let root = service.append(conversation("root"), None).unwrap();
        let mut note = conversation("a note");
        note.log_type = Some(LogType::Note);
        note.related_log_id = Some(root.id.clone());
        let note_row = service.append(note, None).unwrap();

        let removed = service.delete(&root.id).unwrap();
        assert_eq!(removed, vec![root.id.clone(), note_row.id.clone()]);
        assert!(matches!(
            service.delete(&root.id),
            Err(IngestError::NotFound(_))
        ));
    }

    #[test]
    fn events_are_published_without_raw() {
        let (service, _dir) = service();
        let mut subscription = service.hub.subscribe();
        let mut payload = conversation("hello");
        payload.raw = Some("User: hello".into());
        service.append(payload, None).unwrap();
        let event = subscription.try_recv().unwrap();
        assert_eq!(event.event_type, "log.appended");
        assert!(event.data.get("raw").is_none());
    }
}
