//! Shared application state injected into every handler.

use std::sync::Arc;

use clawboard_events::EventHub;
use clawboard_ingest::IngestService;
use clawboard_orchestration::OrchestrationRuntime;
use clawboard_search::SearchEngine;
use clawboard_store::Store;
use clawboard_types::ServerConfig;
use clawboard_vector::ReindexQueue;

use crate::chat::OpenClawGateway;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<Store>,
    pub hub: Arc<EventHub>,
    pub ingest: Arc<IngestService>,
    pub engine: Arc<SearchEngine>,
    pub orchestration: Arc<OrchestrationRuntime>,
    pub reindex: Arc<ReindexQueue>,
    pub chat: Option<Arc<OpenClawGateway>>,
}
