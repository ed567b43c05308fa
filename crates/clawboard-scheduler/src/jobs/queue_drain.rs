//! Ingest queue drain worker.
//!
//! Claims up to a batch of pending envelopes in id order, runs each through
//! the ingest service, and records the outcome. Safe under multiple worker
//! instances: claims are single-row updates and appends are idempotent.

use std::sync::Arc;

use tracing::{debug, warn};

use clawboard_ingest::IngestService;
use clawboard_store::queue;

/// One drain pass. Returns the number of envelopes processed.
pub fn drain_once(ingest: &Arc<IngestService>, batch: usize) -> usize {
    let claimed = match ingest.store().write(|conn| queue::claim_pending(conn, batch)) {
        Ok(items) => items,
        Err(err) => {
            warn!(error = %err, "queue claim failed");
            return 0;
        }
    };
    let mut processed = 0;
    for item in claimed {
        let outcome = ingest.append(item.payload.clone(), None);
        let record = match outcome {
            Ok(entry) => {
                debug!(queue_id = item.id, log_id = %entry.id, "queued entry ingested");
                ingest.store().write(|conn| queue::mark_done(conn, item.id))
            }
            Err(err) => ingest
                .store()
                .write(|conn| queue::mark_failed(conn, item.id, &err.to_string())),
        };
        if let Err(err) = record {
            warn!(queue_id = item.id, error = %err, "queue state update failed");
        }
        processed += 1;
    }
    processed
}
