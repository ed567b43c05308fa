//! Session routing memory persistence.

use rusqlite::{params, Connection, OptionalExtension};

use clawboard_types::{RoutingDecision, SessionRoutingMemory};

use crate::error::StoreError;
use crate::json_column;

pub fn get(conn: &Connection, session_key: &str) -> Result<Option<SessionRoutingMemory>, StoreError> {
    let memory = conn
        .query_row(
            "SELECT session_key, items, updated_at FROM session_routing_memory
             WHERE session_key = ?1",
            [session_key],
            |row| {
                Ok(SessionRoutingMemory {
                    session_key: row.get(0)?,
                    items: json_column::from_json::<Vec<RoutingDecision>>(row.get(1)?),
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(memory)
}

pub fn put(conn: &Connection, memory: &SessionRoutingMemory) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO session_routing_memory (session_key, items, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (session_key) DO UPDATE SET items = ?2, updated_at = ?3",
        params![
            memory.session_key,
            json_column::to_json(&memory.items)?,
            memory.updated_at,
        ],
    )?;
    Ok(())
}

/// Append a decision under the cap, creating the row if needed.
pub fn append_decision(
    conn: &Connection,
    session_key: &str,
    decision: RoutingDecision,
    max_items: usize,
    now: &str,
) -> Result<SessionRoutingMemory, StoreError> {
    let mut memory = get(conn, session_key)?.unwrap_or(SessionRoutingMemory {
        session_key: session_key.to_string(),
        items: Vec::new(),
        updated_at: now.to_string(),
    });
    memory.push(decision, max_items);
    memory.updated_at = now.to_string();
    put(conn, &memory)?;
    Ok(memory)
}

pub fn list(conn: &Connection, limit: usize) -> Result<Vec<SessionRoutingMemory>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT session_key, items, updated_at FROM session_routing_memory
         ORDER BY updated_at DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(SessionRoutingMemory {
                session_key: row.get(0)?,
                items: json_column::from_json::<Vec<RoutingDecision>>(row.get(1)?),
                updated_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn clear(conn: &Connection) -> Result<(), StoreError> {
    conn.execute("DELETE FROM session_routing_memory", [])?;
    Ok(())
}
