//! Index maintenance: drain the reindex queue and reconcile the index
//! against live store rows.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use clawboard_embeddings::EmbeddingProvider;
use clawboard_store::{logs, tasks, topics, LogQuery, Store};
use clawboard_types::log_index_text;

use crate::error::VectorError;
use crate::index::VectorIndex;
use crate::mirrored::MirroredIndex;
use crate::reindex::{ReindexOp, ReindexQueue, ReindexRequest};

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub drained: usize,
    pub applied_upserts: usize,
    pub applied_deletes: usize,
    pub enqueued_upserts: usize,
    pub enqueued_deletes: usize,
    pub remote_deletes: usize,
    pub dry_run: bool,
}

/// Cap on how many recent logs the reconcile pass considers.
const RECONCILE_LOG_WINDOW: usize = 20_000;

/// Drain queued intents into the index, then reconcile the index contents
/// against the desired set computed from live rows. With `dry_run` the
/// queue is left untouched and nothing is written.
pub async fn run_maintenance(
    store: &Store,
    index: &MirroredIndex,
    embedder: &dyn EmbeddingProvider,
    queue: &ReindexQueue,
    dry_run: bool,
) -> Result<MaintenanceReport, VectorError> {
    let mut report = MaintenanceReport {
        dry_run,
        ..Default::default()
    };

    let drained = if dry_run {
        crate::reindex::coalesce(queue.read_all()?)
    } else {
        queue.drain_coalesced()?
    };
    report.drained = drained.len();

    if !dry_run {
        for request in &drained {
            match request.op {
                ReindexOp::Upsert => {
                    let Some(text) = request.text.as_deref().filter(|t| !t.is_empty()) else {
                        continue;
                    };
                    match embedder.embed(text).await {
                        Ok(vector) => {
                            index.upsert(&request.index_kind(), &request.id, &vector).await?;
                            report.applied_upserts += 1;
                        }
                        Err(err) => {
                            // At-least-once: requeue so the next pass retries.
                            warn!(id = %request.id, error = %err, "embed failed, requeueing");
                            queue.enqueue(request)?;
                        }
                    }
                }
                ReindexOp::Delete => {
                    delete_logical(index, &request.kind, &request.id).await?;
                    report.applied_deletes += 1;
                }
            }
        }
    }

    // Desired set from live rows.
    let (desired_points, desired_texts) = compute_desired(store)?;
    let current: HashSet<(String, String)> = index.local().list_points()?.into_iter().collect();

    // Missing points become queued upserts so the next drain embeds them.
    for (point, (text, topic_id)) in &desired_texts {
        if current.contains(point) {
            continue;
        }
        report.enqueued_upserts += 1;
        if !dry_run {
            let (kind, id) = point;
            let logical_kind = if kind.starts_with("task:") { "task" } else { kind.as_str() };
            queue.enqueue(&ReindexRequest::upsert(
                logical_kind,
                id,
                text.clone(),
                topic_id.clone(),
            ))?;
        }
    }

    // Stale points are removed from the mirror and batch-deleted remotely.
    let stale: Vec<(String, String)> = current
        .iter()
        .filter(|point| !desired_points.contains(*point))
        .cloned()
        .collect();
    report.enqueued_deletes = stale.len();
    if !dry_run && !stale.is_empty() {
        for (kind, id) in &stale {
            index.local().delete(kind, id).await?;
        }
        if let Some(remote) = index.remote() {
            match remote.delete_batch(&stale).await {
                Ok(()) => report.remote_deletes = stale.len(),
                Err(err) => warn!(error = %err, "remote batch delete failed"),
            }
        }
    }

    info!(
        drained = report.drained,
        upserts = report.applied_upserts,
        deletes = report.applied_deletes,
        enqueued = report.enqueued_upserts,
        stale = report.enqueued_deletes,
        dry_run,
        "vector maintenance pass complete"
    );
    Ok(report)
}

/// Delete a logical point. Task points are topic-scoped in the index, so a
/// bare `task` delete removes every matching scoped point.
async fn delete_logical(
    index: &MirroredIndex,
    kind: &str,
    id: &str,
) -> Result<(), VectorError> {
    if kind == "task" {
        for (point_kind, point_id) in index.local().list_points()? {
            if point_kind.starts_with("task:") && point_id == id {
                index.delete(&point_kind, &point_id).await?;
            }
        }
        return Ok(());
    }
    index.delete(kind, id).await
}

type DesiredTexts = HashMap<(String, String), (String, Option<String>)>;

fn compute_desired(store: &Store) -> Result<(HashSet<(String, String)>, DesiredTexts), VectorError> {
    let mut points = HashSet::new();
    let mut texts: DesiredTexts = HashMap::new();

    store.read(|conn| {
        for topic in topics::list(conn)? {
            let point = ("topic".to_string(), topic.id.clone());
            let text = match &topic.description {
                Some(description) => format!("{} {}", topic.name, description),
                None => topic.name.clone(),
            };
            points.insert(point.clone());
            texts.insert(point, (text, None));
        }
        for task in tasks::list(conn, None)? {
            let Some(topic_id) = task.topic_id.clone() else {
                continue;
            };
            let point = (format!("task:{topic_id}"), task.id.clone());
            points.insert(point.clone());
            texts.insert(point, (task.title.clone(), Some(topic_id)));
        }
        let mut query = LogQuery::new(RECONCILE_LOG_WINDOW);
        query.include_raw = true;
        for entry in logs::list(conn, &query)? {
            if let Some(text) = log_index_text(&entry) {
                let point = ("log".to_string(), entry.id.clone());
                points.insert(point.clone());
                texts.insert(point, (text, None));
            }
        }
        Ok(())
    })?;

    Ok((points, texts))
}
