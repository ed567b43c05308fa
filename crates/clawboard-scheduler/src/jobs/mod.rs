//! Predefined background jobs.
//!
//! - **queue_drain**: moves durable ingest-queue envelopes into the ingest
//!   service under backpressure
//! - **snooze**: reactivates topics/tasks whose snooze has elapsed
//! - **classifier_cycle**: drives the session classifier
//! - **orchestration_tick**: promotes due orchestration items
//! - **reindex_maintenance**: drains and reconciles the vector index

pub mod classifier_cycle;
pub mod orchestration_tick;
pub mod queue_drain;
pub mod reindex_maintenance;
pub mod snooze;
