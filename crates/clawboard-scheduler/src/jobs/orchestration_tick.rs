//! Orchestration tick driver.

use std::sync::Arc;

use tracing::{debug, warn};

use clawboard_orchestration::OrchestrationRuntime;

pub fn run_once(runtime: &Arc<OrchestrationRuntime>) {
    match runtime.tick() {
        Ok(report) => {
            if report.items_checked > 0 {
                debug!(
                    checked = report.items_checked,
                    stalled = report.items_stalled,
                    completed = report.runs_completed,
                    "orchestration tick"
                );
            }
        }
        Err(err) => warn!(error = %err, "orchestration tick failed"),
    }
}
