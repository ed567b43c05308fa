//! Classifier cycle driver.

use std::sync::Arc;

use tracing::{debug, warn};

use clawboard_classifier::{Classifier, ClassifierError};

/// Run one classifier cycle, treating a held lock as a quiet skip (another
/// instance owns this cycle).
pub async fn run_once(classifier: &Arc<Classifier>) {
    match classifier.run_cycle().await {
        Ok(report) => {
            if report.logs_patched > 0 || report.sessions_failed > 0 {
                debug!(
                    sessions = report.sessions_processed,
                    failed = report.sessions_failed,
                    patched = report.logs_patched,
                    "classifier cycle"
                );
            }
        }
        Err(ClassifierError::LockHeld) => {
            debug!("classifier lock held elsewhere, skipping cycle");
        }
        Err(err) => warn!(error = %err, "classifier cycle failed"),
    }
}
