//! Runtime configuration, read once from the environment at startup.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Singleton instance settings exposed through the config endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: i64,
    pub title: String,
    /// Integration depth (`manual` | `write` | `full`).
    pub integration_level: String,
    pub updated_at: String,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_string(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secret(name: &str) -> Option<SecretString> {
    env_string(name).map(SecretString::from)
}

/// All environment-driven settings.
///
/// Every field has a default so a bare `clawboard-server` starts against a
/// local SQLite file with the classifier and vector remote disabled.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub bind_addr: String,
    pub token: Option<SecretString>,
    pub cors_origins: Vec<String>,
    pub trust_proxy: bool,

    pub event_buffer: usize,
    pub event_subscriber_queue: Option<usize>,

    pub ingest_queue_mode: bool,
    pub queue_poll: Duration,
    pub queue_batch: usize,
    pub snooze_poll: Duration,

    pub classifier_interval: Duration,
    pub classifier_max_attempts: i64,
    pub classifier_window_size: usize,
    pub classifier_lookback_logs: usize,
    pub topic_sim_threshold: f32,
    pub task_sim_threshold: f32,
    pub embed_model: String,
    pub llm_base_url: Option<String>,
    pub llm_token: Option<SecretString>,
    pub llm_model: String,
    pub lock_path: String,

    pub vector_db_path: String,
    pub qdrant_url: Option<String>,
    pub qdrant_collection: String,
    pub qdrant_api_key: Option<SecretString>,
    pub qdrant_dim: usize,
    pub qdrant_timeout: Duration,

    pub reindex_queue_path: String,
    pub session_routing_max_items: usize,
    pub attachments_dir: String,
    pub attachment_max_bytes: u64,

    pub openclaw_base_url: Option<String>,
    pub openclaw_token: Option<SecretString>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/clawboard.db".into(),
            bind_addr: "127.0.0.1:8010".into(),
            token: None,
            cors_origins: Vec::new(),
            trust_proxy: false,
            event_buffer: 500,
            event_subscriber_queue: None,
            ingest_queue_mode: false,
            queue_poll: Duration::from_millis(1500),
            queue_batch: 25,
            snooze_poll: Duration::from_secs(15),
            classifier_interval: Duration::from_secs(10),
            classifier_max_attempts: 3,
            classifier_window_size: 24,
            classifier_lookback_logs: 80,
            topic_sim_threshold: 0.78,
            task_sim_threshold: 0.80,
            embed_model: "BAAI/bge-small-en-v1.5".into(),
            llm_base_url: None,
            llm_token: None,
            llm_model: "openai-codex/gpt-5.2".into(),
            lock_path: "./data/classifier.lock".into(),
            vector_db_path: "./data/classifier_embeddings.db".into(),
            qdrant_url: None,
            qdrant_collection: "clawboard".into(),
            qdrant_api_key: None,
            qdrant_dim: 384,
            qdrant_timeout: Duration::from_secs(12),
            reindex_queue_path: "./data/reindex-queue.jsonl".into(),
            session_routing_max_items: crate::routing::DEFAULT_MAX_ITEMS,
            attachments_dir: "./data/attachments".into(),
            attachment_max_bytes: 8 * 1024 * 1024,
            openclaw_base_url: None,
            openclaw_token: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from `CLAWBOARD_*` environment variables,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env_string("CLAWBOARD_DB_URL").unwrap_or(defaults.db_path),
            bind_addr: env_string("CLAWBOARD_BIND_ADDR").unwrap_or(defaults.bind_addr),
            token: env_secret("CLAWBOARD_TOKEN"),
            cors_origins: env_string("CLAWBOARD_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            trust_proxy: env_string("CLAWBOARD_TRUST_PROXY").as_deref() == Some("1"),
            event_buffer: env_parse("CLAWBOARD_EVENT_BUFFER", defaults.event_buffer),
            event_subscriber_queue: env_string("CLAWBOARD_EVENT_SUBSCRIBER_QUEUE")
                .and_then(|v| v.parse().ok()),
            ingest_queue_mode: env_string("CLAWBOARD_INGEST_MODE")
                .map(|v| v.eq_ignore_ascii_case("queue"))
                .unwrap_or(false),
            queue_poll: Duration::from_secs_f64(env_parse("CLAWBOARD_QUEUE_POLL_SECONDS", 1.5)),
            queue_batch: env_parse("CLAWBOARD_QUEUE_BATCH", defaults.queue_batch),
            snooze_poll: Duration::from_secs_f64(env_parse("CLAWBOARD_SNOOZE_POLL_SECONDS", 15.0)),
            classifier_interval: Duration::from_secs_f64(env_parse(
                "CLAWBOARD_CLASSIFIER_INTERVAL_SECONDS",
                10.0,
            )),
            classifier_max_attempts: env_parse(
                "CLAWBOARD_CLASSIFIER_MAX_ATTEMPTS",
                defaults.classifier_max_attempts,
            ),
            classifier_window_size: env_parse(
                "CLAWBOARD_CLASSIFIER_WINDOW_SIZE",
                defaults.classifier_window_size,
            ),
            classifier_lookback_logs: env_parse(
                "CLAWBOARD_CLASSIFIER_LOOKBACK_LOGS",
                defaults.classifier_lookback_logs,
            ),
            topic_sim_threshold: env_parse(
                "CLAWBOARD_TOPIC_SIM_THRESHOLD",
                defaults.topic_sim_threshold,
            ),
            task_sim_threshold: env_parse(
                "CLAWBOARD_TASK_SIM_THRESHOLD",
                defaults.task_sim_threshold,
            ),
            embed_model: env_string("CLAWBOARD_EMBED_MODEL").unwrap_or(defaults.embed_model),
            llm_base_url: env_string("CLAWBOARD_LLM_BASE_URL"),
            llm_token: env_secret("CLAWBOARD_LLM_TOKEN"),
            llm_model: env_string("CLAWBOARD_LLM_MODEL").unwrap_or(defaults.llm_model),
            lock_path: env_string("CLAWBOARD_LOCK_PATH").unwrap_or(defaults.lock_path),
            vector_db_path: env_string("CLAWBOARD_VECTOR_DB_PATH")
                .unwrap_or(defaults.vector_db_path),
            qdrant_url: env_string("CLAWBOARD_QDRANT_URL"),
            qdrant_collection: env_string("CLAWBOARD_QDRANT_COLLECTION")
                .unwrap_or(defaults.qdrant_collection),
            qdrant_api_key: env_secret("CLAWBOARD_QDRANT_API_KEY"),
            qdrant_dim: env_parse("CLAWBOARD_QDRANT_DIM", defaults.qdrant_dim),
            qdrant_timeout: Duration::from_secs_f64(env_parse("CLAWBOARD_QDRANT_TIMEOUT", 12.0)),
            reindex_queue_path: env_string("CLAWBOARD_REINDEX_QUEUE_PATH")
                .unwrap_or(defaults.reindex_queue_path),
            session_routing_max_items: env_parse(
                "CLAWBOARD_SESSION_ROUTING_MAX_ITEMS",
                defaults.session_routing_max_items,
            ),
            attachments_dir: env_string("CLAWBOARD_ATTACHMENTS_DIR")
                .unwrap_or(defaults.attachments_dir),
            attachment_max_bytes: env_parse(
                "CLAWBOARD_ATTACHMENT_MAX_BYTES",
                defaults.attachment_max_bytes,
            ),
            openclaw_base_url: env_string("CLAWBOARD_OPENCLAW_BASE_URL"),
            openclaw_token: env_secret("CLAWBOARD_OPENCLAW_TOKEN"),
        }
    }
}
