//! Service assembly: construct every component from configuration and run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use clawboard_api::{AppState, OpenClawConfig, OpenClawGateway};
use clawboard_classifier::{
    Classifier, ClassifierConfig, ClassifierLlm, GateAudit, HeuristicGate, HttpLlm, HttpLlmConfig,
    LeaseLock,
};
use clawboard_embeddings::{CachedEmbedder, EmbeddingProvider, HashingEmbedder, HttpEmbedder, HttpEmbedderConfig};
use clawboard_events::EventHub;
use clawboard_ingest::IngestService;
use clawboard_orchestration::{OrchestrationConfig, OrchestrationRuntime};
use clawboard_scheduler::{jobs, Scheduler};
use clawboard_search::SearchEngine;
use clawboard_store::Store;
use clawboard_types::ServerConfig;
use clawboard_vector::{
    run_maintenance, LocalVectorIndex, MirroredIndex, QdrantClient, QdrantConfig, ReindexQueue,
};

struct Services {
    config: Arc<ServerConfig>,
    store: Arc<Store>,
    hub: Arc<EventHub>,
    ingest: Arc<IngestService>,
    index: Arc<MirroredIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    engine: Arc<SearchEngine>,
    reindex: Arc<ReindexQueue>,
    orchestration: Arc<OrchestrationRuntime>,
    classifier: Arc<Classifier>,
}

async fn build() -> anyhow::Result<Services> {
    let config = Arc::new(ServerConfig::from_env());

    let store = Arc::new(Store::open(&config.db_path).context("open store")?);
    let hub = Arc::new(EventHub::new(
        config.event_buffer,
        config.event_subscriber_queue,
    ));
    let reindex = Arc::new(ReindexQueue::new(&config.reindex_queue_path));
    let ingest = Arc::new(IngestService::new(
        store.clone(),
        hub.clone(),
        reindex.clone(),
    ));

    // Embeddings: HTTP provider when configured, deterministic hashing
    // fallback otherwise so retrieval stays functional offline.
    let embedder: Arc<dyn EmbeddingProvider> = match &config.llm_base_url {
        Some(base_url) => {
            // The gateway exposes the OpenAI-compatible surface under /v1.
            let mut embed_config = HttpEmbedderConfig::new(
                format!("{}/v1", base_url.trim_end_matches('/')),
                config.embed_model.clone(),
                config.qdrant_dim,
            );
            embed_config.api_key = config.llm_token.clone();
            match HttpEmbedder::new(embed_config) {
                Ok(http) => Arc::new(CachedEmbedder::new(http, 2048)),
                Err(err) => {
                    warn!(error = %err, "http embedder unavailable, using hashing embedder");
                    Arc::new(HashingEmbedder::new(config.qdrant_dim))
                }
            }
        }
        None => Arc::new(HashingEmbedder::new(config.qdrant_dim)),
    };

    let local_index = LocalVectorIndex::open(&config.vector_db_path).context("open vector store")?;
    let remote = match &config.qdrant_url {
        Some(url) => {
            let client = QdrantClient::new(QdrantConfig {
                url: url.clone(),
                collection: config.qdrant_collection.clone(),
                api_key: config.qdrant_api_key.clone(),
                dimension: config.qdrant_dim,
                timeout: config.qdrant_timeout,
            })
            .context("qdrant client")?;
            if let Err(err) = client.ensure_collection().await {
                warn!(error = %err, "qdrant unavailable, continuing on local mirror");
            }
            Some(client)
        }
        None => None,
    };
    let index = Arc::new(MirroredIndex::new(local_index, remote));
    let engine = Arc::new(SearchEngine::new(index.clone(), embedder.clone()));

    let orchestration = Arc::new(OrchestrationRuntime::new(
        store.clone(),
        OrchestrationConfig::default(),
    ));

    let llm: Option<Arc<dyn ClassifierLlm>> = match &config.llm_base_url {
        Some(base_url) => {
            let mut llm_config = HttpLlmConfig::new(base_url.clone(), config.llm_model.clone());
            llm_config.token = config.llm_token.clone();
            match HttpLlm::new(llm_config) {
                Ok(llm) => Some(Arc::new(llm)),
                Err(err) => {
                    warn!(error = %err, "llm client unavailable, classifier runs heuristically");
                    None
                }
            }
        }
        None => None,
    };
    let stale_after = config.classifier_interval.mul_f32(3.0).max(Duration::from_secs(60));
    let audit_path = std::path::Path::new(&config.lock_path)
        .parent()
        .map(|dir| dir.join("creation-gate-audit.jsonl"));
    let classifier = Arc::new(Classifier::new(
        store.clone(),
        ingest.clone(),
        engine.clone(),
        llm,
        Box::new(HeuristicGate),
        GateAudit::new(audit_path),
        LeaseLock::new(&config.lock_path, stale_after),
        ClassifierConfig {
            interval: config.classifier_interval,
            max_attempts: config.classifier_max_attempts,
            window_size: config.classifier_window_size,
            lookback_logs: config.classifier_lookback_logs,
            topic_sim_threshold: config.topic_sim_threshold,
            task_sim_threshold: config.task_sim_threshold,
            max_sessions_per_cycle: 50,
            routing_max_items: config.session_routing_max_items,
        },
    ));

    Ok(Services {
        config,
        store,
        hub,
        ingest,
        index,
        embedder,
        engine,
        reindex,
        orchestration,
        classifier,
    })
}

pub async fn serve(bind: Option<String>, with_workers: bool) -> anyhow::Result<()> {
    let services = build().await?;
    let config = services.config.clone();

    let chat = match &config.openclaw_base_url {
        Some(base_url) => Some(Arc::new(
            OpenClawGateway::new(OpenClawConfig {
                base_url: base_url.clone(),
                token: config.openclaw_token.clone(),
                timeout: Duration::from_secs(30),
            })
            .context("chat gateway")?,
        )),
        None => None,
    };

    let state = AppState {
        config: config.clone(),
        store: services.store.clone(),
        hub: services.hub.clone(),
        ingest: services.ingest.clone(),
        engine: services.engine.clone(),
        orchestration: services.orchestration.clone(),
        reindex: services.reindex.clone(),
        chat,
    };

    let mut scheduler = Scheduler::new();
    if with_workers {
        if config.ingest_queue_mode {
            let ingest = services.ingest.clone();
            let batch = config.queue_batch;
            scheduler.spawn("queue-drain", config.queue_poll, move || {
                let ingest = ingest.clone();
                async move {
                    jobs::queue_drain::drain_once(&ingest, batch);
                }
            });
        }
        {
            let store = services.store.clone();
            let hub = services.hub.clone();
            scheduler.spawn("snooze", config.snooze_poll, move || {
                let store = store.clone();
                let hub = hub.clone();
                async move {
                    jobs::snooze::revive_due(&store, &hub);
                }
            });
        }
        {
            let classifier = services.classifier.clone();
            scheduler.spawn("classifier", config.classifier_interval, move || {
                let classifier = classifier.clone();
                async move {
                    jobs::classifier_cycle::run_once(&classifier).await;
                }
            });
        }
        {
            let orchestration = services.orchestration.clone();
            scheduler.spawn(
                "orchestration-tick",
                Duration::from_secs(5),
                move || {
                    let orchestration = orchestration.clone();
                    async move {
                        jobs::orchestration_tick::run_once(&orchestration);
                    }
                },
            );
        }
        {
            let store = services.store.clone();
            let index = services.index.clone();
            let embedder = services.embedder.clone();
            let queue = services.reindex.clone();
            scheduler.spawn(
                "reindex-maintenance",
                Duration::from_secs(30),
                move || {
                    let store = store.clone();
                    let index = index.clone();
                    let embedder = embedder.clone();
                    let queue = queue.clone();
                    async move {
                        jobs::reindex_maintenance::run_once(&store, &index, &embedder, &queue)
                            .await;
                    }
                },
            );
        }
    }

    let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    info!(addr = %bind_addr, "clawboard api listening");

    let app = clawboard_api::router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
    .context("serve")?;

    scheduler.shutdown().await;
    Ok(())
}

pub async fn maintenance(dry_run: bool) -> anyhow::Result<()> {
    let services = build().await?;
    let report = run_maintenance(
        &services.store,
        &services.index,
        services.embedder.as_ref(),
        &services.reindex,
        dry_run,
    )
    .await
    .context("maintenance")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
