//! Singleton instance configuration row.

use rusqlite::{params, Connection};

use clawboard_types::Instance;

use crate::error::StoreError;

pub fn get(conn: &Connection) -> Result<Instance, StoreError> {
    let instance = conn.query_row(
        "SELECT id, title, integration_level, updated_at FROM instance WHERE id = 1",
        [],
        |row| {
            Ok(Instance {
                id: row.get(0)?,
                title: row.get(1)?,
                integration_level: row.get(2)?,
                updated_at: row.get(3)?,
            })
        },
    )?;
    Ok(instance)
}

pub fn update(
    conn: &Connection,
    title: Option<&str>,
    integration_level: Option<&str>,
    now: &str,
) -> Result<Instance, StoreError> {
    if let Some(title) = title {
        conn.execute(
            "UPDATE instance SET title = ?1, updated_at = ?2 WHERE id = 1",
            params![title, now],
        )?;
    }
    if let Some(level) = integration_level {
        conn.execute(
            "UPDATE instance SET integration_level = ?1, updated_at = ?2 WHERE id = 1",
            params![level, now],
        )?;
    }
    get(conn)
}
