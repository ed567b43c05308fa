//! # clawboard-scheduler
//!
//! Background worker scheduling: each worker runs in its own tokio task on
//! a fixed poll interval with shared cancellation. The jobs module carries
//! the concrete worker bodies; the server wires them up at startup.

pub mod jobs;
mod scheduler;

pub use scheduler::Scheduler;
