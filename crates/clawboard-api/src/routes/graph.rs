//! Clawgraph endpoint.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use clawboard_graph::{build_graph, GraphOptions};
use clawboard_store::{logs, tasks, topics, LogQuery};
use clawboard_types::{now_iso, ClassificationStatus};

use crate::auth::ensure_read_access;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQuery {
    pub max_entities: Option<usize>,
    pub max_nodes: Option<usize>,
    pub min_edge_weight: Option<f64>,
    pub limit_logs: Option<usize>,
    #[serde(default = "default_true")]
    pub include_pending: bool,
}

fn default_true() -> bool {
    true
}

pub async fn clawgraph(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<GraphQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_read_access(&state.config, &headers, peer)?;
    let options = GraphOptions {
        max_entities: params.max_entities.unwrap_or(120).clamp(20, 400),
        max_nodes: params.max_nodes.unwrap_or(260).clamp(40, 800),
        min_edge_weight: params.min_edge_weight.unwrap_or(0.16).clamp(0.0, 2.0),
    };
    let limit_logs = params.limit_logs.unwrap_or(2400).clamp(100, 20_000);

    let (all_topics, all_tasks, window) = state.store.read(|conn| {
        let topics = topics::list(conn)?;
        let tasks = tasks::list(conn, None)?;
        let query = LogQuery {
            classification_status: (!params.include_pending)
                .then_some(ClassificationStatus::Classified),
            limit: limit_logs,
            ..LogQuery::new(0)
        };
        Ok((topics, tasks, logs::list(conn, &query)?))
    })?;

    let mut graph = build_graph(&all_topics, &all_tasks, &window, options);
    graph.generated_at = Some(now_iso());
    Ok(Json(serde_json::to_value(graph).unwrap_or_default()))
}
