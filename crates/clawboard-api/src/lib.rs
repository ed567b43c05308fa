//! # clawboard-api
//!
//! The HTTP/SSE surface: command and query endpoints over the ingest
//! service, store, search engine, graph builder, event hub, and
//! orchestration runtime. Handlers stay thin; all write semantics live in
//! the services they call.

pub mod auth;
pub mod chat;
pub mod error;
pub mod routes;
pub mod state;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub use chat::{OpenClawConfig, OpenClawGateway};
pub use error::ApiError;
pub use state::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/api/health", get(routes::admin::health))
        .route(
            "/api/config",
            get(routes::config::get_config).post(routes::config::update_config),
        )
        .route(
            "/api/topics",
            get(routes::boards::list_topics).post(routes::boards::upsert_topic),
        )
        .route(
            "/api/topics/reorder",
            post(routes::boards::reorder_topics),
        )
        .route(
            "/api/topics/:id",
            axum::routing::patch(routes::boards::patch_topic).delete(routes::boards::delete_topic),
        )
        .route(
            "/api/tasks",
            get(routes::boards::list_tasks).post(routes::boards::upsert_task),
        )
        .route("/api/tasks/reorder", post(routes::boards::reorder_tasks))
        .route(
            "/api/tasks/:id",
            axum::routing::patch(routes::boards::patch_task).delete(routes::boards::delete_task),
        )
        .route(
            "/api/log",
            get(routes::logs::list_logs).post(routes::logs::append_log),
        )
        .route(
            "/api/log/:id",
            axum::routing::patch(routes::logs::patch_log).delete(routes::logs::delete_log),
        )
        .route("/api/ingest", post(routes::logs::ingest_log))
        .route("/api/classifier/pending", get(routes::classifier::pending))
        .route(
            "/api/classifier/session-routing",
            get(routes::classifier::get_session_routing)
                .post(routes::classifier::append_session_routing),
        )
        .route("/api/classifier/replay", post(routes::classifier::replay))
        .route("/api/search", get(routes::search::search))
        .route("/api/clawgraph", get(routes::graph::clawgraph))
        .route("/api/context", get(routes::admin::context))
        .route("/api/changes", get(routes::changes::changes))
        .route("/api/stream", get(routes::stream::stream))
        .route(
            "/api/spaces",
            get(routes::spaces::list_spaces).post(routes::spaces::upsert_space),
        )
        .route(
            "/api/spaces/allowed",
            get(routes::spaces::allowed_spaces),
        )
        .route(
            "/api/spaces/:id/connectivity",
            axum::routing::patch(routes::spaces::update_connectivity),
        )
        .route("/api/openclaw/chat", post(routes::chat::chat))
        .route("/api/openclaw/chat/cancel", post(routes::chat::cancel))
        .route("/api/reindex", post(routes::admin::request_reindex))
        .route("/api/metrics", get(routes::admin::metrics))
        .route(
            "/api/admin/start-fresh-replay",
            post(routes::admin::start_fresh_replay),
        )
        .layer(cors)
        .with_state(state)
}
