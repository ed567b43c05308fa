//! Topic and task CRUD + manual reorder.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_ingest::{TaskUpsert, TopicUpsert};
use clawboard_store::{tasks, topics};
use clawboard_types::{Task, Topic};

use crate::auth::{ensure_read_access, ensure_write_access};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub ordered_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    pub topic_id: Option<String>,
}

pub async fn list_topics(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<Vec<Topic>>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    Ok(Json(state.store.read(topics::list)?))
}

pub async fn upsert_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TopicUpsert>,
) -> Result<Json<Topic>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    Ok(Json(state.ingest.upsert_topic(payload)?))
}

pub async fn patch_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(topic_id): Path<String>,
    Json(mut payload): Json<TopicUpsert>,
) -> Result<Json<Topic>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    if state.store.read(|conn| topics::get(conn, &topic_id))?.is_none() {
        return Err(ApiError::NotFound);
    }
    payload.id = Some(topic_id);
    Ok(Json(state.ingest.upsert_topic(payload)?))
}

pub async fn delete_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(topic_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    state.ingest.delete_topic(&topic_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn reorder_topics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    if payload.ordered_ids.is_empty() {
        return Err(ApiError::Unprocessable("orderedIds must not be empty".into()));
    }
    let moved = state.ingest.reorder_topics(&payload.ordered_ids)?;
    Ok(Json(serde_json::json!({ "ok": true, "moved": moved })))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    Ok(Json(
        state
            .store
            .read(|conn| tasks::list(conn, query.topic_id.as_deref()))?,
    ))
}

pub async fn upsert_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TaskUpsert>,
) -> Result<Json<Task>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    Ok(Json(state.ingest.upsert_task(payload)?))
}

pub async fn patch_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Json(mut payload): Json<TaskUpsert>,
) -> Result<Json<Task>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    if state.store.read(|conn| tasks::get(conn, &task_id))?.is_none() {
        return Err(ApiError::NotFound);
    }
    payload.id = Some(task_id);
    Ok(Json(state.ingest.upsert_task(payload)?))
}

pub async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    state.ingest.delete_task(&task_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn reorder_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    if payload.ordered_ids.is_empty() {
        return Err(ApiError::Unprocessable("orderedIds must not be empty".into()));
    }
    let moved = state.ingest.reorder_tasks(&payload.ordered_ids)?;
    Ok(Json(serde_json::json!({ "ok": true, "moved": moved })))
}
