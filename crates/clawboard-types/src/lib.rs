//! # clawboard-types
//!
//! Shared domain types for the Clawboard capture-and-organize service.
//!
//! This crate defines the core data structures used throughout the system:
//! - Log entries: timeline atoms appended by chat/agent sessions
//! - Topics and Tasks: durable workstreams the classifier routes logs into
//! - Spaces: tenancy/visibility roots
//! - Ingest queue envelopes, session routing memory, orchestration runs
//! - Canonical timestamp and id helpers
//!
//! All wire-facing structs serialize with camelCase field names and all
//! timestamps are canonical UTC ISO-8601 strings with millisecond precision
//! and a trailing `Z`, so they sort lexicographically.

pub mod config;
pub mod error;
pub mod id;
pub mod log;
pub mod orchestration;
pub mod queue;
pub mod routing;
pub mod space;
pub mod task;
pub mod text;
pub mod time;
pub mod topic;

// Re-export main types at crate root
pub use config::{Instance, ServerConfig};
pub use error::DomainError;
pub use id::create_id;
pub use log::{
    Attachment, ClassificationStatus, LogAppend, LogEntry, LogPatch, LogSource, LogType,
};
pub use orchestration::{OrchestrationItem, OrchestrationRun, OrchestrationStatus};
pub use queue::{IngestQueueItem, QueueStatus};
pub use routing::{RoutingDecision, SessionRoutingMemory};
pub use orchestration::{subagent_item_key, MAIN_RESPONSE_KEY};
pub use space::Space;
pub use task::{Task, TaskStatus};
pub use text::{clip, log_index_text, sanitize_log_text};
pub use time::{normalize_iso, now_iso};
pub use topic::{auto_pick_color, CreatedBy, Priority, Topic, TopicStatus};
