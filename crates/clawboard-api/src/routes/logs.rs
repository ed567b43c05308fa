//! Log timeline endpoints and the queued ingest entry point.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_store::{logs, queue, LogQuery};
use clawboard_types::{now_iso, ClassificationStatus, LogAppend, LogEntry, LogPatch, LogType};

use crate::auth::{ensure_read_access, ensure_write_access};
use crate::error::ApiError;
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";
const MAX_LIST_LIMIT: usize = 5000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogListQuery {
    pub classification_status: Option<ClassificationStatus>,
    #[serde(rename = "type")]
    pub log_type: Option<LogType>,
    pub session_key: Option<String>,
    pub topic_id: Option<String>,
    pub task_id: Option<String>,
    pub related_log_id: Option<String>,
    #[serde(default)]
    pub include_raw: bool,
    #[serde(default)]
    pub ascending: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_logs(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<LogListQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    let query = LogQuery {
        classification_status: params.classification_status,
        log_type: params.log_type,
        session_key: params.session_key,
        topic_id: params.topic_id,
        task_id: params.task_id,
        related_log_id: params.related_log_id,
        space_ids: None,
        include_raw: params.include_raw,
        ascending: params.ascending,
        limit: params.limit.unwrap_or(200).min(MAX_LIST_LIMIT),
        offset: params.offset.unwrap_or(0),
    };
    Ok(Json(state.store.read(|conn| logs::list(conn, &query))?))
}

fn idempotency_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn append_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LogAppend>,
) -> Result<Json<LogEntry>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let header_key = idempotency_header(&headers);
    let entry = state.ingest.append(payload, header_key.as_deref())?;
    Ok(Json(entry))
}

/// `POST /api/ingest`: when queue mode is enabled the payload is parked in
/// the durable queue and drained out of band; otherwise it is a direct
/// append.
pub async fn ingest_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<LogAppend>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let header_key = idempotency_header(&headers);
    if state.config.ingest_queue_mode {
        // The header key must survive until the drain worker appends.
        if payload.idempotency_key.is_none() {
            payload.idempotency_key = header_key;
        }
        let now = now_iso();
        let id = state
            .store
            .write(|conn| queue::enqueue(conn, &payload, &now))?;
        return Ok(Json(serde_json::json!({ "ok": true, "queued": true, "id": id })));
    }
    let entry = state.ingest.append(payload, header_key.as_deref())?;
    Ok(Json(serde_json::json!({ "ok": true, "queued": false, "entry": entry })))
}

pub async fn patch_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(log_id): Path<String>,
    Json(patch): Json<LogPatch>,
) -> Result<Json<LogEntry>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    Ok(Json(state.ingest.patch(&log_id, patch)?))
}

pub async fn delete_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(log_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let deleted = state.ingest.delete(&log_id)?;
    Ok(Json(serde_json::json!({ "ok": true, "deletedIds": deleted })))
}
