//! Hybrid search endpoint: loads the candidate window, runs the engine,
//! and hydrates hits into display rows with notes and diagnostics meta.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_search::{SearchLimits, SearchRequest};
use clawboard_store::{logs, spaces, tasks, topics, LogQuery};
use clawboard_types::{clip, sanitize_log_text, ClassificationStatus, LogEntry, LogType};

use crate::auth::ensure_read_access;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: String,
    pub topic_id: Option<String>,
    pub session_key: Option<String>,
    pub space_id: Option<String>,
    #[serde(default = "default_true")]
    pub include_pending: bool,
    pub limit_topics: Option<usize>,
    pub limit_tasks: Option<usize>,
    pub limit_logs: Option<usize>,
}

fn default_true() -> bool {
    true
}

const MAX_NOTES: usize = 160;

pub async fn search(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;

    let limits = SearchLimits {
        topics: params.limit_topics.unwrap_or(24).clamp(1, 800),
        tasks: params.limit_tasks.unwrap_or(48).clamp(1, 2000),
        logs: params.limit_logs.unwrap_or(360).clamp(10, 5000),
    };

    let allowed_space_ids = match params.space_id.as_deref() {
        Some(space_id) => Some(
            state
                .store
                .read(|conn| spaces::allowed_space_ids(conn, space_id))?,
        ),
        None => None,
    };

    // Candidate window: never the whole log table.
    let window_logs = (limits.logs * 8).clamp(2000, 20_000);
    let (all_topics, all_tasks, window) = state.store.read(|conn| {
        let topics = topics::list(conn)?;
        let tasks = tasks::list(conn, params.topic_id.as_deref())?;
        let query = LogQuery {
            classification_status: (!params.include_pending)
                .then_some(ClassificationStatus::Classified),
            topic_id: params.topic_id.clone(),
            limit: window_logs,
            ..LogQuery::new(0)
        };
        let logs = logs::list(conn, &query)?;
        Ok((topics, tasks, logs))
    })?;

    let outcome = state
        .engine
        .search(
            &all_topics,
            &all_tasks,
            &window,
            &SearchRequest {
                query: params.q.clone(),
                session_key: params.session_key.clone(),
                allowed_space_ids,
                limits,
            },
        )
        .await;

    // Hydrate hits into display rows.
    let topic_map: HashMap<&str, _> = all_topics.iter().map(|t| (t.id.as_str(), t)).collect();
    let task_map: HashMap<&str, _> = all_tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let log_map: HashMap<&str, &LogEntry> = window.iter().map(|l| (l.id.as_str(), l)).collect();

    let topic_rows: Vec<serde_json::Value> = outcome
        .topics
        .iter()
        .filter_map(|hit| {
            topic_map.get(hit.id.as_str()).map(|topic| {
                let mut row = serde_json::to_value(hit).unwrap_or_default();
                row["name"] = serde_json::json!(topic.name);
                row["description"] = serde_json::json!(topic.description);
                row
            })
        })
        .collect();
    let task_rows: Vec<serde_json::Value> = outcome
        .tasks
        .iter()
        .filter_map(|hit| {
            task_map.get(hit.id.as_str()).map(|task| {
                let mut row = serde_json::to_value(hit).unwrap_or_default();
                row["topicId"] = serde_json::json!(task.topic_id);
                row["title"] = serde_json::json!(task.title);
                row["status"] = serde_json::json!(task.status);
                row
            })
        })
        .collect();
    let log_rows: Vec<serde_json::Value> = outcome
        .logs
        .iter()
        .filter_map(|hit| {
            log_map.get(hit.id.as_str()).map(|entry| {
                let mut row = serde_json::to_value(hit).unwrap_or_default();
                row["topicId"] = serde_json::json!(entry.topic_id);
                row["taskId"] = serde_json::json!(entry.task_id);
                row["type"] = serde_json::json!(entry.log_type);
                row["agentId"] = serde_json::json!(entry.agent_id);
                row["agentLabel"] = serde_json::json!(entry.agent_label);
                row["summary"] = serde_json::json!(clip(
                    &sanitize_log_text(entry.summary.as_deref().unwrap_or("")),
                    140
                ));
                row["content"] = serde_json::json!(clip(&sanitize_log_text(&entry.content), 320));
                row["createdAt"] = serde_json::json!(entry.created_at);
                row
            })
        })
        .collect();

    // Notes: up to three per matched log, capped overall.
    let mut notes_by_log: HashMap<&str, Vec<&LogEntry>> = HashMap::new();
    for entry in &window {
        if entry.log_type == LogType::Note {
            if let Some(related) = entry.related_log_id.as_deref() {
                notes_by_log.entry(related).or_default().push(entry);
            }
        }
    }
    let mut note_rows: Vec<serde_json::Value> = Vec::new();
    'outer: for hit in &outcome.logs {
        for note in notes_by_log
            .get(hit.id.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .take(3)
        {
            note_rows.push(serde_json::json!({
                "id": note.id,
                "relatedLogId": note.related_log_id,
                "topicId": note.topic_id,
                "taskId": note.task_id,
                "summary": clip(&sanitize_log_text(note.summary.as_deref().unwrap_or("")), 140),
                "content": clip(&sanitize_log_text(&note.content), 280),
                "createdAt": note.created_at,
            }));
            if note_rows.len() >= MAX_NOTES {
                break 'outer;
            }
        }
    }

    Ok(Json(serde_json::json!({
        "query": outcome.query,
        "mode": outcome.mode,
        "topics": topic_rows,
        "tasks": task_rows,
        "logs": log_rows,
        "notes": note_rows,
        "matchedTopicIds": outcome.topics.iter().map(|h| h.id.clone()).collect::<Vec<_>>(),
        "matchedTaskIds": outcome.tasks.iter().map(|h| h.id.clone()).collect::<Vec<_>>(),
        "matchedLogIds": outcome.logs.iter().map(|h| h.id.clone()).collect::<Vec<_>>(),
        "meta": outcome.meta,
    })))
}
