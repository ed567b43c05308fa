//! Admin, metrics, reindex, and context endpoints.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_store::{instance, logs, queue, routing, tasks, topics, LogQuery};
use clawboard_types::{now_iso, TaskStatus, TopicStatus};
use clawboard_vector::{ReindexOp, ReindexRequest};

use crate::auth::{ensure_read_access, ensure_write_access};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StartFreshReplayRequest {
    pub integration_level: Option<String>,
}

/// Clear derived state (topics, tasks, queue, routing memory), keep every
/// log, and set them pending so the classifier rebuilds the board.
pub async fn start_fresh_replay(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartFreshReplayRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let timestamp = now_iso();
    let integration_level = payload.integration_level.unwrap_or_else(|| "full".into());
    state.store.write(|conn| {
        instance::update(conn, None, Some(&integration_level), &timestamp)?;
        logs::reset_for_replay(conn, &timestamp)?;
        queue::clear(conn)?;
        routing::clear(conn)?;
        conn.execute("DELETE FROM task", [])?;
        conn.execute("DELETE FROM topic", [])?;
        Ok(())
    })?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "resetAt": timestamp,
        "integrationLevel": integration_level,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexBody {
    pub op: ReindexOp,
    pub kind: String,
    pub id: String,
    pub topic_id: Option<String>,
    pub text: Option<String>,
}

pub async fn request_reindex(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ReindexBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let request = ReindexRequest {
        op: body.op,
        kind: body.kind,
        id: body.id,
        topic_id: body.topic_id,
        text: body.text,
        requested_at: now_iso(),
    };
    state
        .reindex
        .enqueue(&request)
        .map_err(|_| ApiError::Internal)?;
    Ok(Json(serde_json::json!({ "ok": true, "queued": true })))
}

/// Ingestion/classifier health counters.
pub async fn metrics(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    let (counts, topic_count, task_count, open_task_count) = state.store.read(|conn| {
        let counts = logs::counts(conn)?;
        let all_topics = topics::list(conn)?;
        let all_tasks = tasks::list(conn, None)?;
        let open = all_tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Done)
            .count();
        Ok((counts, all_topics.len(), all_tasks.len(), open))
    })?;
    Ok(Json(serde_json::json!({
        "logs": counts,
        "topics": { "total": topic_count },
        "tasks": { "total": task_count, "open": open_task_count },
        "generatedAt": now_iso(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextQuery {
    pub session_key: Option<String>,
    pub q: Option<String>,
    pub limit_topics: Option<usize>,
    pub limit_logs: Option<usize>,
}

/// Composed "working set" block for agent priming: active topics with
/// their tasks, the session's routing memory, and an optional semantic
/// block when a query is supplied.
pub async fn context(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<ContextQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    let limit_topics = params.limit_topics.unwrap_or(12).clamp(1, 100);

    let (active_topics, topic_tasks, memory) = state.store.read(|conn| {
        let active: Vec<_> = topics::list(conn)?
            .into_iter()
            .filter(|t| t.status == TopicStatus::Active)
            .take(limit_topics)
            .collect();
        let mut topic_tasks = Vec::new();
        for topic in &active {
            topic_tasks.push(tasks::list(conn, Some(&topic.id))?);
        }
        let memory = match params.session_key.as_deref() {
            Some(session_key) => routing::get(conn, session_key)?,
            None => None,
        };
        Ok((active, topic_tasks, memory))
    })?;

    let working_set: Vec<serde_json::Value> = active_topics
        .iter()
        .zip(topic_tasks.iter())
        .map(|(topic, tasks)| {
            serde_json::json!({
                "topic": topic,
                "tasks": tasks,
            })
        })
        .collect();

    let semantic = match params.q.as_deref().filter(|q| q.len() >= 2) {
        Some(q) => {
            let limit_logs = params.limit_logs.unwrap_or(20).clamp(1, 200);
            let (all_topics, all_tasks, window) = state.store.read(|conn| {
                let query = LogQuery {
                    limit: 2000,
                    ..LogQuery::new(0)
                };
                Ok((topics::list(conn)?, tasks::list(conn, None)?, logs::list(conn, &query)?))
            })?;
            let outcome = state
                .engine
                .search(
                    &all_topics,
                    &all_tasks,
                    &window,
                    &clawboard_search::SearchRequest {
                        query: q.to_string(),
                        session_key: params.session_key.clone(),
                        allowed_space_ids: None,
                        limits: clawboard_search::SearchLimits {
                            topics: 6,
                            tasks: 8,
                            logs: limit_logs,
                        },
                    },
                )
                .await;
            Some(serde_json::json!({
                "mode": outcome.mode,
                "topics": outcome.topics,
                "tasks": outcome.tasks,
                "logs": outcome.logs,
            }))
        }
        None => None,
    };

    Ok(Json(serde_json::json!({
        "generatedAt": now_iso(),
        "workingSet": working_set,
        "routingMemory": memory,
        "semantic": semantic,
    })))
}
