//! Incremental sync endpoint.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_store::{logs, tasks, topics, LogQuery};
use clawboard_types::normalize_iso;

use crate::auth::ensure_read_access;
use crate::error::ApiError;
use crate::state::AppState;

const MAX_LIMIT_LOGS: usize = 20_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesQuery {
    pub since: Option<String>,
    pub limit_logs: Option<usize>,
    #[serde(default)]
    pub include_raw: bool,
}

/// Topics/tasks/logs changed at or after `since`. Logs are capped so a full
/// dump cannot exhaust the process; this endpoint is for incremental sync.
pub async fn changes(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<ChangesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    let limit_logs = params.limit_logs.unwrap_or(2000).min(MAX_LIMIT_LOGS);
    let since = match params.since.as_deref() {
        Some(raw) => Some(
            normalize_iso(Some(raw))
                .ok_or_else(|| ApiError::BadRequest("since must be an ISO timestamp".into()))?,
        ),
        None => None,
    };

    let (mut topic_rows, mut task_rows, log_rows) = state.store.read(|conn| {
        match &since {
            Some(since) => {
                let topic_rows: Vec<_> = topics::list(conn)?
                    .into_iter()
                    .filter(|t| t.updated_at.as_str() >= since.as_str())
                    .collect();
                let task_rows: Vec<_> = tasks::list(conn, None)?
                    .into_iter()
                    .filter(|t| t.updated_at.as_str() >= since.as_str())
                    .collect();
                let log_rows = logs::changed_since(conn, since, limit_logs, params.include_raw)?;
                Ok((topic_rows, task_rows, log_rows))
            }
            None => {
                let query = LogQuery {
                    include_raw: params.include_raw,
                    limit: limit_logs,
                    ..LogQuery::new(0)
                };
                Ok((topics::list(conn)?, tasks::list(conn, None)?, logs::list(conn, &query)?))
            }
        }
    })?;

    topic_rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    task_rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    Ok(Json(serde_json::json!({
        "topics": topic_rows,
        "tasks": task_rows,
        "logs": log_rows,
    })))
}
