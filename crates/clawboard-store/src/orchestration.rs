//! Orchestration run/item persistence.

use rusqlite::{params, Connection, OptionalExtension, Row};

use clawboard_types::{OrchestrationItem, OrchestrationRun, OrchestrationStatus};

use crate::error::StoreError;

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<OrchestrationRun> {
    Ok(OrchestrationRun {
        id: row.get("id")?,
        request_id: row.get("request_id")?,
        session_key: row.get("session_key")?,
        status: row
            .get::<_, String>("status")?
            .parse()
            .unwrap_or(OrchestrationStatus::Running),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<OrchestrationItem> {
    Ok(OrchestrationItem {
        id: row.get("id")?,
        run_id: row.get("run_id")?,
        item_key: row.get("item_key")?,
        status: row
            .get::<_, String>("status")?
            .parse()
            .unwrap_or(OrchestrationStatus::Running),
        attempts: row.get("attempts")?,
        next_check_at: row.get("next_check_at")?,
        last_activity_at: row.get("last_activity_at")?,
        meta: row
            .get::<_, Option<String>>("meta")?
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or(serde_json::Value::Null),
    })
}

const RUN_COLUMNS: &str = "id, request_id, session_key, status, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, run_id, item_key, status, attempts, next_check_at, last_activity_at, meta";

pub fn insert_run(conn: &Connection, run: &OrchestrationRun) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO orchestration_run (id, request_id, session_key, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run.id,
            run.request_id,
            run.session_key,
            run.status.to_string(),
            run.created_at,
            run.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_run_by_request(
    conn: &Connection,
    request_id: &str,
) -> Result<Option<OrchestrationRun>, StoreError> {
    let run = conn
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM orchestration_run WHERE request_id = ?1"),
            [request_id],
            run_from_row,
        )
        .optional()?;
    Ok(run)
}

pub fn set_run_status(
    conn: &Connection,
    run_id: &str,
    status: OrchestrationStatus,
    now: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE orchestration_run SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![run_id, status.to_string(), now],
    )?;
    Ok(())
}

pub fn list_active_runs(conn: &Connection) -> Result<Vec<OrchestrationRun>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RUN_COLUMNS} FROM orchestration_run WHERE status = 'running'
         ORDER BY created_at"
    ))?;
    let runs = stmt
        .query_map([], run_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(runs)
}

/// Insert an item unless one with the same key already exists in the run
/// (duplicate spawn discoveries collapse). Returns whether a row was added.
pub fn upsert_item(conn: &Connection, item: &OrchestrationItem) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT INTO orchestration_item
            (id, run_id, item_key, status, attempts, next_check_at, last_activity_at, meta)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (run_id, item_key) DO NOTHING",
        params![
            item.id,
            item.run_id,
            item.item_key,
            item.status.to_string(),
            item.attempts,
            item.next_check_at,
            item.last_activity_at,
            serde_json::to_string(&item.meta)?,
        ],
    )?;
    Ok(inserted > 0)
}

pub fn update_item(conn: &Connection, item: &OrchestrationItem) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE orchestration_item SET status = ?2, attempts = ?3, next_check_at = ?4,
            last_activity_at = ?5, meta = ?6
         WHERE id = ?1",
        params![
            item.id,
            item.status.to_string(),
            item.attempts,
            item.next_check_at,
            item.last_activity_at,
            serde_json::to_string(&item.meta)?,
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(item.id.clone()));
    }
    Ok(())
}

pub fn items_for_run(conn: &Connection, run_id: &str) -> Result<Vec<OrchestrationItem>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM orchestration_item WHERE run_id = ?1 ORDER BY item_key"
    ))?;
    let items = stmt
        .query_map([run_id], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Running items whose `next_check_at` has passed.
pub fn due_items(conn: &Connection, now: &str) -> Result<Vec<OrchestrationItem>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM orchestration_item
         WHERE status = 'running' AND next_check_at IS NOT NULL AND next_check_at <= ?1
         ORDER BY next_check_at"
    ))?;
    let items = stmt
        .query_map([now], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use clawboard_types::{create_id, now_iso, subagent_item_key, MAIN_RESPONSE_KEY};

    fn make_run(request_id: &str) -> OrchestrationRun {
        let now = now_iso();
        OrchestrationRun {
            id: create_id("run"),
            request_id: request_id.into(),
            session_key: "agent:coding:main".into(),
            status: OrchestrationStatus::Running,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn make_item(run_id: &str, key: &str) -> OrchestrationItem {
        OrchestrationItem {
            id: create_id("orchitem"),
            run_id: run_id.into(),
            item_key: key.into(),
            status: OrchestrationStatus::Running,
            attempts: 0,
            next_check_at: Some(now_iso()),
            last_activity_at: None,
            meta: serde_json::json!({}),
        }
    }

    #[test]
    fn duplicate_item_keys_collapse() {
        let store = Store::open_in_memory().unwrap();
        let run = make_run("req-1");
        store.write(|conn| insert_run(conn, &run)).unwrap();
        let key = subagent_item_key("agent:coding:subagent:c1");
        let first = make_item(&run.id, &key);
        let second = make_item(&run.id, &key);
        assert!(store.write(|conn| upsert_item(conn, &first)).unwrap());
        assert!(!store.write(|conn| upsert_item(conn, &second)).unwrap());
        let items = store.read(|conn| items_for_run(conn, &run.id)).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn due_items_respect_next_check() {
        let store = Store::open_in_memory().unwrap();
        let run = make_run("req-2");
        store.write(|conn| insert_run(conn, &run)).unwrap();
        let mut soon = make_item(&run.id, MAIN_RESPONSE_KEY);
        soon.next_check_at = Some("2026-01-01T00:00:00.000Z".into());
        let mut later = make_item(&run.id, "subagent:x");
        later.next_check_at = Some("2099-01-01T00:00:00.000Z".into());
        store
            .write(|conn| {
                upsert_item(conn, &soon)?;
                upsert_item(conn, &later)?;
                Ok(())
            })
            .unwrap();
        let due = store
            .read(|conn| due_items(conn, "2026-06-01T00:00:00.000Z"))
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].item_key, MAIN_RESPONSE_KEY);
    }
}
