//! # clawboard-orchestration
//!
//! Tracks multi-agent runs spawned by chat dispatches. One run per request
//! id with a `main.response` item; successful `sessions_spawn` tool results
//! derive idempotent `subagent:<childSessionKey>` items. A run completes
//! only when every item is done; a periodic tick promotes items whose check
//! time has passed and stalls silent ones.

mod runtime;

pub use runtime::{OrchestrationConfig, OrchestrationRuntime, TickReport};
