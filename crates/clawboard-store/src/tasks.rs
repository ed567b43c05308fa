//! Task queries.

use rusqlite::{params, Connection, OptionalExtension, Row};

use clawboard_types::{CreatedBy, Priority, Task, TaskStatus};

use crate::error::StoreError;
use crate::json_column;

const TASK_COLUMNS: &str = "id, space_id, topic_id, title, created_by, sort_index, color, \
     status, priority, due_date, snoozed_until, tags, pinned, digest, digest_updated_at, \
     created_at, updated_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        space_id: row.get("space_id")?,
        topic_id: row.get("topic_id")?,
        title: row.get("title")?,
        created_by: json_column::parse_enum::<CreatedBy>(row.get::<_, String>("created_by")?),
        sort_index: row.get("sort_index")?,
        color: row.get("color")?,
        status: json_column::parse_enum::<TaskStatus>(row.get::<_, String>("status")?),
        priority: json_column::parse_enum_opt::<Priority>(row.get("priority")?),
        due_date: row.get("due_date")?,
        snoozed_until: row.get("snoozed_until")?,
        tags: json_column::from_json(row.get::<_, Option<String>>("tags")?),
        pinned: row.get("pinned")?,
        digest: row.get("digest")?,
        digest_updated_at: row.get("digest_updated_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO task (id, space_id, topic_id, title, created_by, sort_index, color,
            status, priority, due_date, snoozed_until, tags, pinned, digest, digest_updated_at,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            task.id,
            task.space_id,
            task.topic_id,
            task.title,
            task.created_by.to_string(),
            task.sort_index,
            task.color,
            task.status.to_string(),
            task.priority.map(|p| p.to_string()),
            task.due_date,
            task.snoozed_until,
            serde_json::to_string(&task.tags)?,
            task.pinned,
            task.digest,
            task.digest_updated_at,
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE task SET space_id = ?2, topic_id = ?3, title = ?4, created_by = ?5,
            sort_index = ?6, color = ?7, status = ?8, priority = ?9, due_date = ?10,
            snoozed_until = ?11, tags = ?12, pinned = ?13, digest = ?14,
            digest_updated_at = ?15, created_at = ?16, updated_at = ?17
         WHERE id = ?1",
        params![
            task.id,
            task.space_id,
            task.topic_id,
            task.title,
            task.created_by.to_string(),
            task.sort_index,
            task.color,
            task.status.to_string(),
            task.priority.map(|p| p.to_string()),
            task.due_date,
            task.snoozed_until,
            serde_json::to_string(&task.tags)?,
            task.pinned,
            task.digest,
            task.digest_updated_at,
            task.created_at,
            task.updated_at,
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(task.id.clone()));
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Task>, StoreError> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM task WHERE id = ?1"),
            [id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

/// All tasks, optionally restricted to one topic, in display order.
pub fn list(conn: &Connection, topic_id: Option<&str>) -> Result<Vec<Task>, StoreError> {
    let base = format!(
        "SELECT {TASK_COLUMNS} FROM task {} ORDER BY pinned DESC, sort_index ASC, updated_at DESC",
        if topic_id.is_some() {
            "WHERE topic_id = ?1"
        } else {
            ""
        }
    );
    let mut stmt = conn.prepare(&base)?;
    let tasks = match topic_id {
        Some(tid) => stmt
            .query_map([tid], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(tasks)
}

/// Delete a task, detaching its logs.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    conn.execute("UPDATE log_entry SET task_id = NULL WHERE task_id = ?1", [id])?;
    let deleted = conn.execute("DELETE FROM task WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

/// Sort index that places a new task at the top of its pinned group within
/// the topic.
pub fn next_sort_index(
    conn: &Connection,
    topic_id: Option<&str>,
    pinned: bool,
) -> Result<i64, StoreError> {
    let min: Option<i64> = match topic_id {
        Some(tid) => conn.query_row(
            "SELECT MIN(sort_index) FROM task WHERE topic_id = ?1 AND pinned = ?2",
            params![tid, pinned],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT MIN(sort_index) FROM task WHERE topic_id IS NULL AND pinned = ?1",
            params![pinned],
            |row| row.get(0),
        )?,
    };
    Ok(min.map(|m| m - 1).unwrap_or(0))
}

pub fn reorder(conn: &Connection, ordered_ids: &[String], now: &str) -> Result<usize, StoreError> {
    let mut moved = 0;
    for (index, id) in ordered_ids.iter().enumerate() {
        moved += conn.execute(
            "UPDATE task SET sort_index = ?1, updated_at = ?3 WHERE id = ?2",
            params![index as i64, id, now],
        )?;
    }
    Ok(moved)
}

/// Tasks whose snooze has elapsed.
pub fn due_snoozed(conn: &Connection, now: &str) -> Result<Vec<Task>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM task
         WHERE snoozed_until IS NOT NULL AND snoozed_until <= ?1"
    ))?;
    let tasks = stmt
        .query_map([now], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}
