//! Instance config endpoints.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_store::instance;
use clawboard_types::now_iso;

use crate::auth::{ensure_read_access, ensure_write_access};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceUpdate {
    pub title: Option<String>,
    pub integration_level: Option<String>,
}

fn config_body(state: &AppState, instance: clawboard_types::Instance) -> serde_json::Value {
    serde_json::json!({
        "instance": instance,
        "tokenRequired": true,
        "tokenConfigured": state.config.token.is_some(),
    })
}

pub async fn get_config(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    let instance = state.store.read(instance::get)?;
    Ok(Json(config_body(&state, instance)))
}

pub async fn update_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<InstanceUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    if let Some(level) = payload.integration_level.as_deref() {
        if !matches!(level, "manual" | "write" | "full") {
            return Err(ApiError::Unprocessable(
                "integrationLevel must be manual | write | full".into(),
            ));
        }
    }
    let now = now_iso();
    let instance = state.store.write(|conn| {
        instance::update(
            conn,
            payload.title.as_deref(),
            payload.integration_level.as_deref(),
            &now,
        )
    })?;
    Ok(Json(config_body(&state, instance)))
}
