//! Vector index maintenance driver.

use std::sync::Arc;

use tracing::{debug, warn};

use clawboard_embeddings::EmbeddingProvider;
use clawboard_store::Store;
use clawboard_vector::{run_maintenance, MirroredIndex, ReindexQueue};

pub async fn run_once(
    store: &Arc<Store>,
    index: &Arc<MirroredIndex>,
    embedder: &Arc<dyn EmbeddingProvider>,
    queue: &Arc<ReindexQueue>,
) {
    match run_maintenance(store, index, embedder.as_ref(), queue, false).await {
        Ok(report) => {
            if report.drained > 0 || report.enqueued_upserts > 0 || report.enqueued_deletes > 0 {
                debug!(
                    drained = report.drained,
                    upserts = report.applied_upserts,
                    deletes = report.applied_deletes,
                    "reindex maintenance"
                );
            }
        }
        Err(err) => warn!(error = %err, "reindex maintenance failed"),
    }
}
