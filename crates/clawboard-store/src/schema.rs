//! Schema bootstrap and additive migration.
//!
//! `migrate` is safe to run on every startup: tables and indexes are created
//! `IF NOT EXISTS`, later columns are added via `PRAGMA table_info` checks,
//! and backfills are deterministic so an upgrade does not reshuffle what
//! users see.

use rusqlite::Connection;
use tracing::info;

use clawboard_types::space::{DEFAULT_SPACE_ID, DEFAULT_SPACE_NAME};
use clawboard_types::time::now_iso;

use crate::error::StoreError;

/// Create missing tables, columns, and indexes, then seed required rows.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS space (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            color TEXT,
            default_visible INTEGER NOT NULL DEFAULT 1,
            connectivity TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS topic (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task (
            id TEXT PRIMARY KEY,
            topic_id TEXT,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS log_entry (
            id TEXT PRIMARY KEY,
            topic_id TEXT,
            task_id TEXT,
            related_log_id TEXT,
            type TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            summary TEXT,
            raw TEXT,
            created_at TEXT NOT NULL,
            agent_id TEXT,
            agent_label TEXT,
            source TEXT
        );

        CREATE TABLE IF NOT EXISTS ingest_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_routing_memory (
            session_key TEXT PRIMARY KEY,
            items TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS orchestration_run (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL UNIQUE,
            session_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS orchestration_item (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            item_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            attempts INTEGER NOT NULL DEFAULT 0,
            next_check_at TEXT,
            last_activity_at TEXT,
            meta TEXT NOT NULL DEFAULT '{}',
            UNIQUE (run_id, item_key)
        );

        CREATE TABLE IF NOT EXISTS instance (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            title TEXT NOT NULL,
            integration_level TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    migrate_topic_columns(conn)?;
    migrate_task_columns(conn)?;
    migrate_log_columns(conn)?;
    create_indexes(conn)?;
    seed_rows(conn)?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ensure_column(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool, StoreError> {
    if has_column(conn, table, column)? {
        return Ok(false);
    }
    info!(table, column, "adding missing column");
    conn.execute(
        &format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"),
        [],
    )?;
    Ok(true)
}

fn migrate_topic_columns(conn: &Connection) -> Result<(), StoreError> {
    ensure_column(conn, "topic", "created_by", "TEXT NOT NULL DEFAULT 'user'")?;
    ensure_column(conn, "topic", "color", "TEXT")?;
    ensure_column(conn, "topic", "description", "TEXT")?;
    ensure_column(conn, "topic", "priority", "TEXT")?;
    ensure_column(conn, "topic", "status", "TEXT NOT NULL DEFAULT 'active'")?;
    ensure_column(conn, "topic", "snoozed_until", "TEXT")?;
    ensure_column(conn, "topic", "tags", "TEXT NOT NULL DEFAULT '[]'")?;
    ensure_column(conn, "topic", "parent_id", "TEXT")?;
    ensure_column(conn, "topic", "pinned", "INTEGER NOT NULL DEFAULT 0")?;
    ensure_column(conn, "topic", "digest", "TEXT")?;
    ensure_column(conn, "topic", "digest_updated_at", "TEXT")?;
    ensure_column(
        conn,
        "topic",
        "space_id",
        &format!("TEXT NOT NULL DEFAULT '{DEFAULT_SPACE_ID}'"),
    )?;
    let added_sort = ensure_column(conn, "topic", "sort_index", "INTEGER NOT NULL DEFAULT 0")?;
    if added_sort {
        backfill_sort_index(conn, "topic")?;
    }
    Ok(())
}

fn migrate_task_columns(conn: &Connection) -> Result<(), StoreError> {
    ensure_column(conn, "task", "created_by", "TEXT NOT NULL DEFAULT 'user'")?;
    ensure_column(conn, "task", "color", "TEXT")?;
    ensure_column(conn, "task", "status", "TEXT NOT NULL DEFAULT 'todo'")?;
    ensure_column(conn, "task", "priority", "TEXT")?;
    ensure_column(conn, "task", "due_date", "TEXT")?;
    ensure_column(conn, "task", "snoozed_until", "TEXT")?;
    ensure_column(conn, "task", "tags", "TEXT NOT NULL DEFAULT '[]'")?;
    ensure_column(conn, "task", "pinned", "INTEGER NOT NULL DEFAULT 0")?;
    ensure_column(conn, "task", "digest", "TEXT")?;
    ensure_column(conn, "task", "digest_updated_at", "TEXT")?;
    ensure_column(
        conn,
        "task",
        "space_id",
        &format!("TEXT NOT NULL DEFAULT '{DEFAULT_SPACE_ID}'"),
    )?;
    let added_sort = ensure_column(conn, "task", "sort_index", "INTEGER NOT NULL DEFAULT 0")?;
    if added_sort {
        backfill_sort_index(conn, "task")?;
    }
    Ok(())
}

/// Assign sort_index from the pre-upgrade ordering (pinned first, newest
/// activity first) so adding the column does not reshuffle listings.
fn backfill_sort_index(conn: &Connection, table: &str) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {table} ORDER BY pinned DESC, updated_at DESC"
    ))?;
    let ids: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    for (index, id) in ids.iter().enumerate() {
        conn.execute(
            &format!("UPDATE {table} SET sort_index = ?1 WHERE id = ?2"),
            rusqlite::params![index as i64, id],
        )?;
    }
    Ok(())
}

fn migrate_log_columns(conn: &Connection) -> Result<(), StoreError> {
    ensure_column(
        conn,
        "log_entry",
        "classification_status",
        "TEXT NOT NULL DEFAULT 'pending'",
    )?;
    ensure_column(
        conn,
        "log_entry",
        "classification_attempts",
        "INTEGER NOT NULL DEFAULT 0",
    )?;
    ensure_column(conn, "log_entry", "classification_error", "TEXT")?;
    ensure_column(conn, "log_entry", "updated_at", "TEXT NOT NULL DEFAULT ''")?;
    ensure_column(conn, "log_entry", "idempotency_key", "TEXT")?;
    ensure_column(conn, "log_entry", "attachments", "TEXT")?;
    // Materialized from source.sessionKey at write time so session scans
    // stay on a plain index.
    ensure_column(conn, "log_entry", "session_key", "TEXT")?;
    ensure_column(
        conn,
        "log_entry",
        "space_id",
        &format!("TEXT NOT NULL DEFAULT '{DEFAULT_SPACE_ID}'"),
    )?;
    Ok(())
}

fn create_indexes(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS ix_log_status_type_created
            ON log_entry (classification_status, type, created_at);
        CREATE INDEX IF NOT EXISTS ix_log_topic_created
            ON log_entry (topic_id, created_at);
        CREATE INDEX IF NOT EXISTS ix_log_task_created
            ON log_entry (task_id, created_at);
        CREATE INDEX IF NOT EXISTS ix_log_related_created
            ON log_entry (related_log_id, created_at);
        CREATE INDEX IF NOT EXISTS ix_log_session_key
            ON log_entry (session_key);
        CREATE INDEX IF NOT EXISTS ix_log_updated
            ON log_entry (updated_at);
        CREATE INDEX IF NOT EXISTS ix_log_created
            ON log_entry (created_at);
        CREATE INDEX IF NOT EXISTS ix_log_space_created
            ON log_entry (space_id, created_at);
        CREATE UNIQUE INDEX IF NOT EXISTS ux_log_idempotency
            ON log_entry (idempotency_key)
            WHERE idempotency_key IS NOT NULL;
        CREATE INDEX IF NOT EXISTS ix_topic_space_updated
            ON topic (space_id, updated_at);
        CREATE INDEX IF NOT EXISTS ix_topic_updated
            ON topic (updated_at);
        CREATE INDEX IF NOT EXISTS ix_task_space_updated
            ON task (space_id, updated_at);
        CREATE INDEX IF NOT EXISTS ix_task_updated
            ON task (updated_at);
        CREATE INDEX IF NOT EXISTS ix_task_topic
            ON task (topic_id);
        CREATE INDEX IF NOT EXISTS ix_queue_status_id
            ON ingest_queue (status, id);
        CREATE INDEX IF NOT EXISTS ix_orch_item_run
            ON orchestration_item (run_id);
        CREATE INDEX IF NOT EXISTS ix_orch_item_next_check
            ON orchestration_item (status, next_check_at);
        "#,
    )?;
    Ok(())
}

fn seed_rows(conn: &Connection) -> Result<(), StoreError> {
    let now = now_iso();
    conn.execute(
        "INSERT OR IGNORE INTO space (id, name, default_visible, connectivity, created_at, updated_at)
         VALUES (?1, ?2, 1, '{}', ?3, ?3)",
        rusqlite::params![DEFAULT_SPACE_ID, DEFAULT_SPACE_NAME, now],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO instance (id, title, integration_level, updated_at)
         VALUES (1, 'Clawboard', 'manual', ?1)",
        rusqlite::params![now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let spaces: i64 = conn
            .query_row("SELECT COUNT(*) FROM space", [], |row| row.get(0))
            .unwrap();
        assert_eq!(spaces, 1);
    }

    #[test]
    fn migrate_upgrades_a_minimal_legacy_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE topic (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            INSERT INTO topic VALUES ('topic-a', 'Alpha', '2026-01-01T00:00:00.000Z', '2026-01-02T00:00:00.000Z');
            INSERT INTO topic VALUES ('topic-b', 'Beta', '2026-01-01T00:00:00.000Z', '2026-01-03T00:00:00.000Z');",
        )
        .unwrap();
        migrate(&conn).unwrap();
        // Rows survive and backfilled sort_index follows updated_at desc.
        let (first, second): (String, String) = conn
            .query_row(
                "SELECT
                    (SELECT id FROM topic ORDER BY sort_index LIMIT 1),
                    (SELECT id FROM topic ORDER BY sort_index DESC LIMIT 1)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(first, "topic-b");
        assert_eq!(second, "topic-a");
    }

    #[test]
    fn idempotency_index_is_partial() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        // Two NULL keys are fine; two equal non-null keys are not.
        for id in ["log-1", "log-2"] {
            conn.execute(
                "INSERT INTO log_entry (id, type, content, created_at, updated_at)
                 VALUES (?1, 'conversation', 'x', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z')",
                [id],
            )
            .unwrap();
        }
        conn.execute(
            "UPDATE log_entry SET idempotency_key = 'k1' WHERE id = 'log-1'",
            [],
        )
        .unwrap();
        let err = conn
            .execute(
                "UPDATE log_entry SET idempotency_key = 'k1' WHERE id = 'log-2'",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("unique"));
    }
}
