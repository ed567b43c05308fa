//! Ingest queue persistence.

use rusqlite::{params, Connection, Row};

use clawboard_types::{IngestQueueItem, LogAppend, QueueStatus};

use crate::error::StoreError;
use crate::json_column;

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<IngestQueueItem> {
    Ok(IngestQueueItem {
        id: row.get("id")?,
        payload: json_column::from_json::<LogAppend>(row.get("payload")?),
        status: row
            .get::<_, String>("status")?
            .parse()
            .unwrap_or(QueueStatus::Failed),
        attempts: row.get("attempts")?,
        last_error: row.get("last_error")?,
        created_at: row.get("created_at")?,
    })
}

pub fn enqueue(conn: &Connection, payload: &LogAppend, now: &str) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO ingest_queue (payload, status, attempts, created_at)
         VALUES (?1, 'pending', 0, ?2)",
        params![json_column::to_json(payload)?, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Claim up to `batch` pending envelopes in id order, marking them
/// `processing`. State transitions are single-row updates, so multiple
/// worker instances stay safe.
pub fn claim_pending(conn: &Connection, batch: usize) -> Result<Vec<IngestQueueItem>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, payload, status, attempts, last_error, created_at
         FROM ingest_queue WHERE status = 'pending' ORDER BY id LIMIT ?1",
    )?;
    let items: Vec<IngestQueueItem> = stmt
        .query_map([batch as i64], item_from_row)?
        .collect::<Result<_, _>>()?;
    for item in &items {
        conn.execute(
            "UPDATE ingest_queue SET status = 'processing' WHERE id = ?1",
            [item.id],
        )?;
    }
    Ok(items)
}

pub fn mark_done(conn: &Connection, id: i64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE ingest_queue SET status = 'done', attempts = attempts + 1, last_error = NULL
         WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

pub fn mark_failed(conn: &Connection, id: i64, error: &str) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE ingest_queue SET status = 'failed', attempts = attempts + 1, last_error = ?2
         WHERE id = ?1",
        params![id, error],
    )?;
    Ok(())
}

pub fn clear(conn: &Connection) -> Result<(), StoreError> {
    conn.execute("DELETE FROM ingest_queue", [])?;
    Ok(())
}
