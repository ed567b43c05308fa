//! Chat dispatch: persist the user log, record the orchestration run, then
//! relay to the external gateway. Persistence failure fails the request
//! closed; gateway failure surfaces as a system log in the session thread.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use clawboard_types::{clip, create_id, ClassificationStatus, LogAppend, LogSource, LogType};

use crate::auth::ensure_write_access;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_key: String,
    pub message: String,
    pub agent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCancelRequest {
    pub request_id: String,
}

/// Write a visible error into the originating session thread.
fn log_chat_error(state: &AppState, session_key: &str, request_id: &str, detail: &str) {
    let payload = LogAppend {
        log_type: Some(LogType::System),
        content: Some(detail.to_string()),
        summary: Some(clip(detail, 160)),
        agent_id: Some("system".into()),
        agent_label: Some("Clawboard".into()),
        classification_status: Some(ClassificationStatus::Classified),
        source: Some(LogSource {
            session_key: Some(session_key.to_string()),
            channel: Some("clawboard".into()),
            request_id: Some(request_id.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    if let Err(err) = state.ingest.append(payload, None) {
        warn!(error = %err, "failed to persist chat error log");
    }
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let session_key = payload.session_key.trim().to_string();
    if session_key.is_empty() {
        return Err(ApiError::Unprocessable("sessionKey is required".into()));
    }
    if payload.message.trim().is_empty() {
        return Err(ApiError::Unprocessable("message is required".into()));
    }
    let Some(gateway) = state.chat.clone() else {
        return Err(ApiError::BadRequest(
            "chat gateway is not configured".into(),
        ));
    };

    let request_id = create_id("req");
    let agent_id = payload.agent_id.clone().unwrap_or_else(|| "main".into());

    // Persist the user message first; if this fails the request fails
    // closed and nothing reaches the gateway.
    let user_log = state.ingest.append(
        LogAppend {
            log_type: Some(LogType::Conversation),
            content: Some(payload.message.clone()),
            agent_id: Some("user".into()),
            agent_label: Some("User".into()),
            source: Some(LogSource {
                session_key: Some(session_key.clone()),
                channel: Some("clawboard".into()),
                request_id: Some(request_id.clone()),
                ..Default::default()
            }),
            ..Default::default()
        },
        None,
    )?;

    state
        .orchestration
        .record_dispatch(&request_id, &session_key)?;

    // Dispatch out of band so the HTTP response is immediate.
    let dispatch_state = state.clone();
    let dispatch_session = session_key.clone();
    let dispatch_request = request_id.clone();
    let message = payload.message.clone();
    tokio::spawn(async move {
        if let Err(err) = gateway
            .dispatch(&dispatch_request, &dispatch_session, &agent_id, &message)
            .await
        {
            warn!(request_id = %dispatch_request, error = %err, "chat dispatch failed");
            log_chat_error(
                &dispatch_state,
                &dispatch_session,
                &dispatch_request,
                &format!("Chat dispatch failed: {err}"),
            );
        }
    });

    Ok(Json(serde_json::json!({
        "ok": true,
        "requestId": request_id,
        "logId": user_log.id,
    })))
}

pub async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatCancelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let cancelled = state.orchestration.cancel(&payload.request_id)?;
    if !cancelled {
        return Err(ApiError::NotFound);
    }
    if let Some(gateway) = state.chat.clone() {
        let request_id = payload.request_id.clone();
        tokio::spawn(async move {
            if let Err(err) = gateway.abort(&request_id).await {
                warn!(request_id = %request_id, error = %err, "gateway abort failed");
            }
        });
    }
    Ok(Json(serde_json::json!({ "ok": true, "cancelled": true })))
}
