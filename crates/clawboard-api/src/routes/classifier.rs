//! Classifier support endpoints: pending feed, routing-memory CRUD, and
//! targeted replay.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_store::{logs, routing, LogQuery};
use clawboard_types::{now_iso, ClassificationStatus, LogEntry, LogType, RoutingDecision};

use crate::auth::ensure_write_access;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn pending(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PendingQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let query = LogQuery {
        classification_status: Some(ClassificationStatus::Pending),
        log_type: Some(LogType::Conversation),
        ascending: true,
        limit: params.limit.unwrap_or(500).min(2000),
        offset: params.offset.unwrap_or(0),
        ..LogQuery::new(0)
    };
    Ok(Json(state.store.read(|conn| logs::list(conn, &query))?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMemoryQuery {
    pub session_key: Option<String>,
    pub limit: Option<usize>,
}

pub async fn get_session_routing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RoutingMemoryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    match params.session_key.as_deref() {
        Some(session_key) => {
            let memory = state
                .store
                .read(|conn| routing::get(conn, session_key))?;
            match memory {
                Some(memory) => Ok(Json(serde_json::to_value(memory).unwrap_or_default())),
                None => Ok(Json(serde_json::json!({
                    "sessionKey": session_key,
                    "items": [],
                    "updatedAt": null,
                }))),
            }
        }
        None => {
            let all = state
                .store
                .read(|conn| routing::list(conn, params.limit.unwrap_or(100).min(500)))?;
            Ok(Json(serde_json::to_value(all).unwrap_or_default()))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMemoryAppend {
    pub session_key: String,
    pub topic_id: String,
    pub topic_name: String,
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub anchor: String,
}

pub async fn append_session_routing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RoutingMemoryAppend>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    if payload.session_key.trim().is_empty() {
        return Err(ApiError::Unprocessable("sessionKey is required".into()));
    }
    let now = now_iso();
    let decision = RoutingDecision {
        ts: now.clone(),
        topic_id: payload.topic_id,
        topic_name: payload.topic_name,
        task_id: payload.task_id,
        task_title: payload.task_title,
        anchor: payload.anchor,
    };
    let max_items = state.config.session_routing_max_items;
    let memory = state.store.write(|conn| {
        routing::append_decision(conn, &payload.session_key, decision.clone(), max_items, &now)
    })?;
    Ok(Json(serde_json::to_value(memory).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    pub log_ids: Vec<String>,
}

/// Targeted replay: the only path that moves `failed` logs back to
/// `pending`.
pub async fn replay(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReplayRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    if payload.log_ids.is_empty() {
        return Err(ApiError::Unprocessable("logIds must not be empty".into()));
    }
    let now = now_iso();
    let updated = state.store.write(|conn| {
        let mut updated = 0usize;
        for log_id in &payload.log_ids {
            if let Some(mut entry) = logs::get(conn, log_id)? {
                entry.classification_status = ClassificationStatus::Pending;
                entry.classification_error = None;
                entry.classification_attempts = 0;
                entry.updated_at = now.clone();
                logs::update(conn, &entry)?;
                updated += 1;
            }
        }
        Ok(updated)
    })?;
    Ok(Json(serde_json::json!({ "ok": true, "updated": updated })))
}
