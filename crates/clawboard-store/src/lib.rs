//! # clawboard-store
//!
//! Relational persistence for Clawboard on SQLite.
//!
//! Provides:
//! - Schema bootstrap with additive, restart-safe migration
//! - A busy-retry write wrapper for concurrent producers
//! - Per-table query modules (topics, tasks, logs, spaces, queue,
//!   routing memory, orchestration, instance config)
//!
//! The [`Store`] hands out short-lived session connections; query functions
//! take `&Connection` so callers can compose several operations inside one
//! `write` closure.

pub mod db;
pub mod error;
pub mod instance;
pub mod json_column;
pub mod logs;
pub mod orchestration;
pub mod queue;
pub mod routing;
pub mod schema;
pub mod spaces;
pub mod tasks;
pub mod topics;

pub use db::Store;
pub use error::StoreError;
pub use logs::{LogCounts, LogQuery};
