//! # clawboard-ingest
//!
//! The write path: validated, idempotent log ingestion with retry-safe
//! deduplication, ingest-time filters, snooze revival, and event/reindex
//! fan-out, plus the topic/task mutations every producer funnels through.

pub mod boards;
pub mod error;
pub mod filters;
pub mod idempotency;
pub mod service;

pub use boards::{label_similarity, TaskUpsert, TopicUpsert};
pub use error::IngestError;
pub use filters::{evaluate as evaluate_filters, FilterOutcome};
pub use idempotency::resolve_key;
pub use service::IngestService;
