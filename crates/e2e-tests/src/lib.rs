//! Shared fixtures for end-to-end pipeline tests.
//!
//! Builds the whole in-process stack (store, event hub, reindex queue,
//! ingest service, vector index, search engine, classifier, orchestration)
//! against a temp directory, with the deterministic hashing embedder so no
//! external capability is required.

use std::sync::Arc;
use std::time::Duration;

use clawboard_classifier::{
    Classifier, ClassifierConfig, ClassifierLlm, GateAudit, HeuristicGate, LeaseLock,
};
use clawboard_embeddings::{EmbeddingProvider, HashingEmbedder};
use clawboard_events::EventHub;
use clawboard_ingest::IngestService;
use clawboard_orchestration::{OrchestrationConfig, OrchestrationRuntime};
use clawboard_search::SearchEngine;
use clawboard_store::Store;
use clawboard_types::{LogAppend, LogEntry, LogSource, LogType};
use clawboard_vector::{LocalVectorIndex, MirroredIndex, ReindexQueue, VectorIndex};

pub struct TestStack {
    pub store: Arc<Store>,
    pub hub: Arc<EventHub>,
    pub ingest: Arc<IngestService>,
    pub index: Arc<MirroredIndex>,
    pub embedder: Arc<HashingEmbedder>,
    pub engine: Arc<SearchEngine>,
    pub reindex: Arc<ReindexQueue>,
    pub orchestration: Arc<OrchestrationRuntime>,
    pub dir: tempfile::TempDir,
}

impl TestStack {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::open_in_memory().expect("store"));
        let hub = Arc::new(EventHub::new(500, None));
        let reindex = Arc::new(ReindexQueue::new(dir.path().join("reindex.jsonl")));
        let ingest = Arc::new(IngestService::new(
            store.clone(),
            hub.clone(),
            reindex.clone(),
        ));
        let index = Arc::new(MirroredIndex::new(
            LocalVectorIndex::open_in_memory().expect("vector index"),
            None,
        ));
        let embedder = Arc::new(HashingEmbedder::new(64));
        let engine = Arc::new(SearchEngine::new(index.clone(), embedder.clone()));
        let orchestration = Arc::new(OrchestrationRuntime::new(
            store.clone(),
            OrchestrationConfig::default(),
        ));
        Self {
            store,
            hub,
            ingest,
            index,
            embedder,
            engine,
            reindex,
            orchestration,
            dir,
        }
    }

    pub fn classifier(&self, llm: Option<Arc<dyn ClassifierLlm>>) -> Classifier {
        Classifier::new(
            self.store.clone(),
            self.ingest.clone(),
            self.engine.clone(),
            llm,
            Box::new(HeuristicGate),
            GateAudit::new(Some(self.dir.path().join("gate-audit.jsonl"))),
            LeaseLock::new(
                self.dir.path().join("classifier.lock"),
                Duration::from_secs(60),
            ),
            ClassifierConfig::default(),
        )
    }

    /// Seed a vector for retrieval tests.
    pub async fn seed_vector(&self, kind: &str, id: &str, text: &str) {
        let vector = self.embedder.embed(text).await.expect("embed");
        self.index.upsert(kind, id, &vector).await.expect("upsert");
    }

    /// Append a conversation turn on a session.
    pub fn turn(&self, session: &str, agent: &str, content: &str, message_id: &str) -> LogEntry {
        self.ingest
            .append(
                LogAppend {
                    log_type: Some(LogType::Conversation),
                    content: Some(content.into()),
                    agent_id: Some(agent.into()),
                    source: Some(LogSource {
                        channel: Some("discord".into()),
                        session_key: Some(session.into()),
                        message_id: Some(message_id.into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                None,
            )
            .expect("append turn")
    }
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}
