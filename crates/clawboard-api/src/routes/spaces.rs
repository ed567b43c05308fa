//! Tenancy and visibility endpoints.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_events::BoardEvent;
use clawboard_store::spaces;
use clawboard_types::{create_id, now_iso, Space};

use crate::auth::{ensure_read_access, ensure_write_access};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_spaces(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<Vec<Space>>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    Ok(Json(state.store.read(spaces::list)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceUpsert {
    pub id: Option<String>,
    pub name: String,
    pub color: Option<String>,
    pub default_visible: Option<bool>,
}

pub async fn upsert_space(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SpaceUpsert>,
) -> Result<Json<Space>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    if payload.name.trim().is_empty() {
        return Err(ApiError::Unprocessable("space name is required".into()));
    }
    let now = now_iso();
    let space = state.store.write(|conn| {
        let existing = match payload.id.as_deref() {
            Some(id) => spaces::get(conn, id)?,
            None => None,
        };
        let mut space = existing.unwrap_or_else(|| Space {
            id: payload.id.clone().unwrap_or_else(|| create_id("space")),
            name: String::new(),
            color: None,
            default_visible: payload.default_visible.unwrap_or(true),
            connectivity: BTreeMap::new(),
            created_at: now.clone(),
            updated_at: now.clone(),
        });
        space.name = payload.name.trim().to_string();
        if let Some(color) = &payload.color {
            space.color = Some(color.clone());
        }
        if let Some(default_visible) = payload.default_visible {
            space.default_visible = default_visible;
        }
        space.updated_at = now.clone();
        spaces::upsert(conn, &space)?;
        Ok(space)
    })?;
    state.hub.publish(
        BoardEvent::new("space.upserted", serde_json::to_value(&space).unwrap_or_default())
            .with_ts(space.updated_at.clone()),
    );
    Ok(Json(space))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityUpdate {
    pub connectivity: BTreeMap<String, bool>,
}

pub async fn update_connectivity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(space_id): Path<String>,
    Json(payload): Json<ConnectivityUpdate>,
) -> Result<Json<Space>, ApiError> {
    ensure_write_access(&state.config, &headers)?;
    let now = now_iso();
    let space = state.store.write(|conn| {
        let Some(mut space) = spaces::get(conn, &space_id)? else {
            return Err(clawboard_store::StoreError::NotFound(space_id.clone()));
        };
        space.connectivity = payload.connectivity.clone();
        space.normalize_connectivity();
        space.updated_at = now.clone();
        spaces::upsert(conn, &space)?;
        Ok(space)
    })?;
    state.hub.publish(
        BoardEvent::new("space.upserted", serde_json::to_value(&space).unwrap_or_default())
            .with_ts(space.updated_at.clone()),
    );
    Ok(Json(space))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedQuery {
    pub space_id: String,
}

pub async fn allowed_spaces(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AllowedQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    let allowed = state
        .store
        .read(|conn| spaces::allowed_space_ids(conn, &query.space_id))?;
    Ok(Json(serde_json::json!({
        "spaceId": query.space_id,
        "allowedSpaceIds": allowed,
    })))
}
