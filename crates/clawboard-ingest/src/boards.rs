//! Topic and task mutations.
//!
//! All board writes run through the ingest service so duplicate-name
//! guarding, color assignment, ordering, events, and reindexing behave the
//! same whether the caller is the API or the classifier.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clawboard_events::BoardEvent;
use clawboard_store::{tasks, topics, StoreError};
use clawboard_types::topic::normalize_hex_color;
use clawboard_types::{
    auto_pick_color, create_id, now_iso, CreatedBy, Priority, Task, TaskStatus, Topic, TopicStatus,
};
use clawboard_vector::ReindexRequest;

use crate::error::IngestError;
use crate::service::IngestService;

/// Label-similarity threshold above which an incoming topic name is treated
/// as the existing topic.
const TOPIC_NAME_THRESHOLD: f32 = 0.80;
/// Tasks collide more easily (short titles), so the bar is higher.
const TASK_TITLE_THRESHOLD: f32 = 0.88;

/// Producer-facing topic upsert payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicUpsert {
    pub id: Option<String>,
    pub name: Option<String>,
    pub space_id: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TopicStatus>,
    pub snoozed_until: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub parent_id: Option<String>,
    pub pinned: Option<bool>,
    pub digest: Option<String>,
    pub created_by: Option<CreatedBy>,
}

/// Producer-facing task upsert payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskUpsert {
    pub id: Option<String>,
    pub topic_id: Option<String>,
    pub title: Option<String>,
    pub space_id: Option<String>,
    pub color: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub snoozed_until: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub pinned: Option<bool>,
    pub digest: Option<String>,
    pub created_by: Option<CreatedBy>,
}

/// Normalize a label for similarity comparison: lowercase, common
/// abbreviations expanded, punctuation stripped.
fn normalize_label(value: &str) -> String {
    let lowered = value.to_lowercase();
    let mut words: Vec<String> = Vec::new();
    for word in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let expanded = match word {
            "ops" => "operations",
            "msg" => "message",
            "msgs" => "messages",
            other => other,
        };
        words.push(expanded.to_string());
    }
    words.join(" ")
}

fn bigrams(value: &str) -> BTreeSet<(char, char)> {
    let chars: Vec<char> = value.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Similarity between two labels: character-bigram Dice blended with token
/// Jaccard, both over normalized forms.
pub fn label_similarity(a: &str, b: &str) -> f32 {
    let na = normalize_label(a);
    let nb = normalize_label(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    let ba = bigrams(&na);
    let bb = bigrams(&nb);
    let dice = if ba.is_empty() || bb.is_empty() {
        if na == nb {
            1.0
        } else {
            0.0
        }
    } else {
        2.0 * ba.intersection(&bb).count() as f32 / (ba.len() + bb.len()) as f32
    };
    let ta: BTreeSet<&str> = na.split(' ').filter(|t| t.len() > 2).collect();
    let tb: BTreeSet<&str> = nb.split(' ').filter(|t| t.len() > 2).collect();
    let jaccard = if ta.is_empty() && tb.is_empty() {
        0.0
    } else {
        let union = ta.union(&tb).count();
        if union == 0 {
            0.0
        } else {
            ta.intersection(&tb).count() as f32 / union as f32
        }
    };
    dice * 0.72 + jaccard * 0.28
}

impl IngestService {
    /// Create or update a topic. Unnamed creates are rejected; an incoming
    /// name close enough to an existing topic updates that topic instead of
    /// spawning a near-duplicate.
    pub fn upsert_topic(&self, payload: TopicUpsert) -> Result<Topic, IngestError> {
        if payload.id.is_none()
            && payload
                .name
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(IngestError::Validation("topic name is required".into()));
        }
        let now = now_iso();
        let topic = self.store().write(|conn| {
            let existing = match payload.id.as_deref() {
                Some(id) => topics::get(conn, id)?,
                None => None,
            };
            let existing = match existing {
                Some(topic) => Some(topic),
                None => match payload.name.as_deref() {
                    Some(name) => find_similar_topic(conn, name)?,
                    None => None,
                },
            };

            match existing {
                Some(mut topic) => {
                    let mut digest_only = true;
                    if let Some(name) = payload.name.clone().filter(|n| !n.trim().is_empty()) {
                        if name != topic.name {
                            topic.name = name;
                            digest_only = false;
                        }
                    }
                    if let Some(color) = normalize_hex_color(payload.color.as_deref()) {
                        topic.color = Some(color);
                        digest_only = false;
                    }
                    if let Some(description) = payload.description.clone() {
                        topic.description = Some(description);
                        digest_only = false;
                    }
                    if let Some(priority) = payload.priority {
                        topic.priority = Some(priority);
                        digest_only = false;
                    }
                    if let Some(status) = payload.status {
                        topic.status = status;
                        digest_only = false;
                    }
                    if let Some(snoozed) = payload.snoozed_until.clone() {
                        topic.snoozed_until = snoozed;
                        if topic.snoozed_until.is_some() {
                            topic.status = TopicStatus::Snoozed;
                        }
                        digest_only = false;
                    }
                    if let Some(tags) = payload.tags.clone() {
                        // Classifier tags merge; they never erase user tags.
                        for tag in tags {
                            if !topic.tags.contains(&tag) {
                                topic.tags.push(tag);
                            }
                        }
                        digest_only = false;
                    }
                    if let Some(parent_id) = payload.parent_id.clone() {
                        topic.parent_id = Some(parent_id).filter(|p| !p.is_empty());
                        digest_only = false;
                    }
                    if let Some(pinned) = payload.pinned {
                        if pinned != topic.pinned {
                            topic.pinned = pinned;
                            topic.sort_index = topics::next_sort_index(conn, pinned)?;
                        }
                        digest_only = false;
                    }
                    if let Some(digest) = payload.digest.clone() {
                        topic.digest = Some(digest);
                        topic.digest_updated_at = Some(now.clone());
                    }
                    // Digest refreshes are system-managed and must not bump
                    // user-visible ordering.
                    if !digest_only || payload.digest.is_none() {
                        topic.updated_at = now.clone();
                    }
                    topics::update(conn, &topic)?;
                    Ok(topic)
                }
                None => {
                    let name = payload
                        .name
                        .clone()
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .ok_or_else(|| {
                            StoreError::Serialization("topic name is required".into())
                        })?;
                    let pinned = payload.pinned.unwrap_or(false);
                    let color = normalize_hex_color(payload.color.as_deref())
                        .unwrap_or_else(|| auto_pick_color(&name, &used_colors(conn)));
                    let topic = Topic {
                        id: payload.id.clone().unwrap_or_else(|| create_id("topic")),
                        space_id: payload
                            .space_id
                            .clone()
                            .unwrap_or_else(|| clawboard_types::space::DEFAULT_SPACE_ID.into()),
                        name,
                        created_by: payload.created_by.unwrap_or(CreatedBy::User),
                        sort_index: topics::next_sort_index(conn, pinned)?,
                        color: Some(color),
                        description: payload.description.clone(),
                        priority: payload.priority,
                        status: payload.status.unwrap_or(TopicStatus::Active),
                        snoozed_until: payload.snoozed_until.clone().flatten(),
                        tags: payload.tags.clone().unwrap_or_default(),
                        parent_id: payload.parent_id.clone(),
                        pinned,
                        digest: payload.digest.clone(),
                        digest_updated_at: payload.digest.as_ref().map(|_| now.clone()),
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    topics::insert(conn, &topic)?;
                    Ok(topic)
                }
            }
        })?;

        self.publish_board_event("topic.upserted", &topic, &topic.updated_at);
        let text = match &topic.description {
            Some(d) => format!("{} {}", topic.name, d),
            None => topic.name.clone(),
        };
        self.enqueue_reindex(ReindexRequest::upsert("topic", &topic.id, text, None));
        info!(topic_id = %topic.id, name = %topic.name, "upserted topic");
        Ok(topic)
    }

    pub fn delete_topic(&self, topic_id: &str) -> Result<(), IngestError> {
        let deleted = self.store().write(|conn| topics::delete(conn, topic_id))?;
        if !deleted {
            return Err(IngestError::NotFound(topic_id.to_string()));
        }
        self.hub().publish(
            BoardEvent::new("topic.deleted", serde_json::json!({ "id": topic_id }))
                .with_ts(now_iso()),
        );
        self.enqueue_reindex(ReindexRequest::delete("topic", topic_id));
        Ok(())
    }

    /// Rewrite manual ordering for the listed topics.
    pub fn reorder_topics(&self, ordered_ids: &[String]) -> Result<usize, IngestError> {
        let now = now_iso();
        let moved = self
            .store()
            .write(|conn| topics::reorder(conn, ordered_ids, &now))?;
        for id in ordered_ids {
            if let Ok(Some(topic)) = self.store().read(|conn| topics::get(conn, id)) {
                self.publish_board_event("topic.upserted", &topic, &topic.updated_at);
            }
        }
        Ok(moved)
    }

    /// Create or update a task, guarding against near-duplicate titles
    /// within the same topic.
    pub fn upsert_task(&self, payload: TaskUpsert) -> Result<Task, IngestError> {
        if payload.id.is_none()
            && payload
                .title
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return Err(IngestError::Validation("task title is required".into()));
        }
        let now = now_iso();
        let task = self.store().write(|conn| {
            let existing = match payload.id.as_deref() {
                Some(id) => tasks::get(conn, id)?,
                None => None,
            };
            let existing = match existing {
                Some(task) => Some(task),
                None => match payload.title.as_deref() {
                    Some(title) => {
                        find_similar_task(conn, payload.topic_id.as_deref(), title)?
                    }
                    None => None,
                },
            };

            match existing {
                Some(mut task) => {
                    let mut digest_only = true;
                    if let Some(title) = payload.title.clone().filter(|t| !t.trim().is_empty()) {
                        if title != task.title {
                            task.title = title;
                            digest_only = false;
                        }
                    }
                    if let Some(topic_id) = payload.topic_id.clone() {
                        task.topic_id = Some(topic_id).filter(|t| !t.is_empty());
                        digest_only = false;
                    }
                    if let Some(color) = normalize_hex_color(payload.color.as_deref()) {
                        task.color = Some(color);
                        digest_only = false;
                    }
                    if let Some(status) = payload.status {
                        task.status = status;
                        digest_only = false;
                    }
                    if let Some(priority) = payload.priority {
                        task.priority = Some(priority);
                        digest_only = false;
                    }
                    if let Some(due_date) = payload.due_date.clone() {
                        task.due_date = Some(due_date).filter(|d| !d.is_empty());
                        digest_only = false;
                    }
                    if let Some(snoozed) = payload.snoozed_until.clone() {
                        task.snoozed_until = snoozed;
                        digest_only = false;
                    }
                    if let Some(tags) = payload.tags.clone() {
                        for tag in tags {
                            if !task.tags.contains(&tag) {
                                task.tags.push(tag);
                            }
                        }
                        digest_only = false;
                    }
                    if let Some(pinned) = payload.pinned {
                        if pinned != task.pinned {
                            task.pinned = pinned;
                            task.sort_index =
                                tasks::next_sort_index(conn, task.topic_id.as_deref(), pinned)?;
                        }
                        digest_only = false;
                    }
                    if let Some(digest) = payload.digest.clone() {
                        task.digest = Some(digest);
                        task.digest_updated_at = Some(now.clone());
                    }
                    if !digest_only || payload.digest.is_none() {
                        task.updated_at = now.clone();
                    }
                    tasks::update(conn, &task)?;
                    Ok(task)
                }
                None => {
                    let title = payload
                        .title
                        .clone()
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .ok_or_else(|| {
                            StoreError::Serialization("task title is required".into())
                        })?;
                    let pinned = payload.pinned.unwrap_or(false);
                    let topic_id = payload.topic_id.clone().filter(|t| !t.is_empty());
                    let task = Task {
                        id: payload.id.clone().unwrap_or_else(|| create_id("task")),
                        space_id: payload
                            .space_id
                            .clone()
                            .unwrap_or_else(|| clawboard_types::space::DEFAULT_SPACE_ID.into()),
                        topic_id: topic_id.clone(),
                        title,
                        created_by: payload.created_by.unwrap_or(CreatedBy::User),
                        sort_index: tasks::next_sort_index(conn, topic_id.as_deref(), pinned)?,
                        color: normalize_hex_color(payload.color.as_deref()),
                        status: payload.status.unwrap_or(TaskStatus::Todo),
                        priority: payload.priority,
                        due_date: payload.due_date.clone(),
                        snoozed_until: payload.snoozed_until.clone().flatten(),
                        tags: payload.tags.clone().unwrap_or_default(),
                        pinned,
                        digest: payload.digest.clone(),
                        digest_updated_at: payload.digest.as_ref().map(|_| now.clone()),
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    tasks::insert(conn, &task)?;
                    Ok(task)
                }
            }
        })?;

        self.publish_board_event("task.upserted", &task, &task.updated_at);
        if let Some(topic_id) = &task.topic_id {
            self.enqueue_reindex(ReindexRequest::upsert(
                "task",
                &task.id,
                task.title.clone(),
                Some(topic_id.clone()),
            ));
        }
        Ok(task)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), IngestError> {
        let deleted = self.store().write(|conn| tasks::delete(conn, task_id))?;
        if !deleted {
            return Err(IngestError::NotFound(task_id.to_string()));
        }
        self.hub().publish(
            BoardEvent::new("task.deleted", serde_json::json!({ "id": task_id }))
                .with_ts(now_iso()),
        );
        self.enqueue_reindex(ReindexRequest::delete("task", task_id));
        Ok(())
    }

    pub fn reorder_tasks(&self, ordered_ids: &[String]) -> Result<usize, IngestError> {
        let now = now_iso();
        let moved = self
            .store()
            .write(|conn| tasks::reorder(conn, ordered_ids, &now))?;
        for id in ordered_ids {
            if let Ok(Some(task)) = self.store().read(|conn| tasks::get(conn, id)) {
                self.publish_board_event("task.upserted", &task, &task.updated_at);
            }
        }
        Ok(moved)
    }

    fn publish_board_event<T: serde::Serialize>(&self, event_type: &str, row: &T, ts: &str) {
        self.hub().publish(
            BoardEvent::new(event_type, serde_json::to_value(row).unwrap_or_default())
                .with_ts(ts.to_string()),
        );
    }

    fn enqueue_reindex(&self, request: ReindexRequest) {
        if let Err(err) = self.reindex_queue().enqueue(&request) {
            warn!(error = %err, "reindex enqueue failed");
        }
    }
}

fn used_colors(conn: &rusqlite::Connection) -> BTreeSet<String> {
    topics::used_colors(conn).unwrap_or_default()
}

fn find_similar_topic(
    conn: &rusqlite::Connection,
    name: &str,
) -> Result<Option<Topic>, StoreError> {
    if name.trim().is_empty() {
        return Ok(None);
    }
    let mut best: Option<(f32, Topic)> = None;
    for topic in topics::list(conn)? {
        let score = label_similarity(&topic.name, name);
        if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, topic));
        }
    }
    Ok(best
        .filter(|(score, _)| *score >= TOPIC_NAME_THRESHOLD)
        .map(|(_, topic)| topic))
}

fn find_similar_task(
    conn: &rusqlite::Connection,
    topic_id: Option<&str>,
    title: &str,
) -> Result<Option<Task>, StoreError> {
    if title.trim().is_empty() {
        return Ok(None);
    }
    let mut best: Option<(f32, Task)> = None;
    for task in tasks::list(conn, None)? {
        if task.topic_id.as_deref() != topic_id {
            continue;
        }
        let score = label_similarity(&task.title, title);
        if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, task));
        }
    }
    Ok(best
        .filter(|(score, _)| *score >= TASK_TITLE_THRESHOLD)
        .map(|(_, task)| task))
}
