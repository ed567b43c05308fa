//! Log entry queries.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use clawboard_types::{Attachment, ClassificationStatus, LogEntry, LogSource, LogType};

use crate::error::StoreError;
use crate::json_column;

const LOG_COLUMNS: &str = "id, space_id, topic_id, task_id, related_log_id, idempotency_key, \
     type, content, summary, raw, classification_status, classification_attempts, \
     classification_error, created_at, updated_at, agent_id, agent_label, source, attachments";

/// Same columns with the large raw body omitted, for bulk windows.
const LOG_COLUMNS_SLIM: &str = "id, space_id, topic_id, task_id, related_log_id, \
     idempotency_key, type, content, summary, NULL AS raw, classification_status, \
     classification_attempts, classification_error, created_at, updated_at, agent_id, \
     agent_label, source, attachments";

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get("id")?,
        space_id: row.get("space_id")?,
        topic_id: row.get("topic_id")?,
        task_id: row.get("task_id")?,
        related_log_id: row.get("related_log_id")?,
        idempotency_key: row.get("idempotency_key")?,
        log_type: row
            .get::<_, String>("type")?
            .parse()
            .unwrap_or(LogType::System),
        content: row.get("content")?,
        summary: row.get("summary")?,
        raw: row.get("raw")?,
        classification_status: json_column::parse_enum::<ClassificationStatus>(
            row.get::<_, String>("classification_status")?,
        ),
        classification_attempts: row.get("classification_attempts")?,
        classification_error: row.get("classification_error")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        agent_id: row.get("agent_id")?,
        agent_label: row.get("agent_label")?,
        source: json_column::from_json_opt::<LogSource>(row.get("source")?),
        attachments: json_column::from_json_opt::<Vec<Attachment>>(row.get("attachments")?),
    })
}

pub fn insert(conn: &Connection, entry: &LogEntry) -> Result<(), StoreError> {
    let session_key = entry.session_key().map(|s| s.to_string());
    let result = conn.execute(
        "INSERT INTO log_entry (id, space_id, topic_id, task_id, related_log_id,
            idempotency_key, type, content, summary, raw, classification_status,
            classification_attempts, classification_error, created_at, updated_at,
            agent_id, agent_label, source, attachments, session_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            entry.id,
            entry.space_id,
            entry.topic_id,
            entry.task_id,
            entry.related_log_id,
            entry.idempotency_key,
            entry.log_type.to_string(),
            entry.content,
            entry.summary,
            entry.raw,
            entry.classification_status.to_string(),
            entry.classification_attempts,
            entry.classification_error,
            entry.created_at,
            entry.updated_at,
            entry.agent_id,
            entry.agent_label,
            entry
                .source
                .as_ref()
                .map(json_column::to_json)
                .transpose()?,
            entry
                .attachments
                .as_ref()
                .map(json_column::to_json)
                .transpose()?,
            session_key,
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(err @ rusqlite::Error::SqliteFailure(code, _))
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StoreError::Duplicate(err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn update(conn: &Connection, entry: &LogEntry) -> Result<(), StoreError> {
    let session_key = entry.session_key().map(|s| s.to_string());
    let changed = conn.execute(
        "UPDATE log_entry SET space_id = ?2, topic_id = ?3, task_id = ?4, related_log_id = ?5,
            idempotency_key = ?6, type = ?7, content = ?8, summary = ?9, raw = ?10,
            classification_status = ?11, classification_attempts = ?12,
            classification_error = ?13, created_at = ?14, updated_at = ?15, agent_id = ?16,
            agent_label = ?17, source = ?18, attachments = ?19, session_key = ?20
         WHERE id = ?1",
        params![
            entry.id,
            entry.space_id,
            entry.topic_id,
            entry.task_id,
            entry.related_log_id,
            entry.idempotency_key,
            entry.log_type.to_string(),
            entry.content,
            entry.summary,
            entry.raw,
            entry.classification_status.to_string(),
            entry.classification_attempts,
            entry.classification_error,
            entry.created_at,
            entry.updated_at,
            entry.agent_id,
            entry.agent_label,
            entry
                .source
                .as_ref()
                .map(json_column::to_json)
                .transpose()?,
            entry
                .attachments
                .as_ref()
                .map(json_column::to_json)
                .transpose()?,
            session_key,
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(entry.id.clone()));
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<LogEntry>, StoreError> {
    let entry = conn
        .query_row(
            &format!("SELECT {LOG_COLUMNS} FROM log_entry WHERE id = ?1"),
            [id],
            log_from_row,
        )
        .optional()?;
    Ok(entry)
}

pub fn find_by_idempotency(conn: &Connection, key: &str) -> Result<Option<LogEntry>, StoreError> {
    let entry = conn
        .query_row(
            &format!("SELECT {LOG_COLUMNS} FROM log_entry WHERE idempotency_key = ?1"),
            [key],
            log_from_row,
        )
        .optional()?;
    Ok(entry)
}

/// Legacy dedupe for keyless conversation retries: match on the source
/// message id (and channel/agent when present).
pub fn find_by_source_message(
    conn: &Connection,
    log_type: LogType,
    agent_id: Option<&str>,
    message_id: &str,
    channel: Option<&str>,
) -> Result<Option<LogEntry>, StoreError> {
    let mut sql = format!(
        "SELECT {LOG_COLUMNS} FROM log_entry
         WHERE type = ?1 AND json_extract(source, '$.messageId') = ?2"
    );
    let mut args: Vec<String> = vec![log_type.to_string(), message_id.to_string()];
    if let Some(agent) = agent_id.filter(|a| !a.is_empty()) {
        args.push(agent.to_string());
        sql.push_str(&format!(" AND agent_id = ?{}", args.len()));
    }
    if let Some(channel) = channel.filter(|c| !c.is_empty()) {
        args.push(channel.to_string());
        sql.push_str(&format!(" AND json_extract(source, '$.channel') = ?{}", args.len()));
    }
    sql.push_str(" LIMIT 1");
    let entry = conn
        .query_row(&sql, params_from_iter(args.iter()), log_from_row)
        .optional()?;
    Ok(entry)
}

/// Filter for timeline listings. Unset fields are not constrained.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub classification_status: Option<ClassificationStatus>,
    pub log_type: Option<LogType>,
    pub session_key: Option<String>,
    pub topic_id: Option<String>,
    pub task_id: Option<String>,
    pub related_log_id: Option<String>,
    pub space_ids: Option<Vec<String>>,
    pub include_raw: bool,
    /// Ascending creation order when true (classifier), newest-first otherwise.
    pub ascending: bool,
    pub limit: usize,
    pub offset: usize,
}

impl LogQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// List log entries matching the query. Ties on `created_at` break on the
/// store's insertion order (rowid) so per-session ordering is stable.
pub fn list(conn: &Connection, query: &LogQuery) -> Result<Vec<LogEntry>, StoreError> {
    let columns = if query.include_raw {
        LOG_COLUMNS
    } else {
        LOG_COLUMNS_SLIM
    };
    let mut sql = format!("SELECT {columns} FROM log_entry WHERE 1=1");
    let mut args: Vec<String> = Vec::new();

    if let Some(status) = query.classification_status {
        args.push(status.to_string());
        sql.push_str(&format!(" AND classification_status = ?{}", args.len()));
    }
    if let Some(log_type) = query.log_type {
        args.push(log_type.to_string());
        sql.push_str(&format!(" AND type = ?{}", args.len()));
    }
    if let Some(session_key) = &query.session_key {
        args.push(session_key.clone());
        sql.push_str(&format!(" AND session_key = ?{}", args.len()));
    }
    if let Some(topic_id) = &query.topic_id {
        args.push(topic_id.clone());
        sql.push_str(&format!(" AND topic_id = ?{}", args.len()));
    }
    if let Some(task_id) = &query.task_id {
        args.push(task_id.clone());
        sql.push_str(&format!(" AND task_id = ?{}", args.len()));
    }
    if let Some(related) = &query.related_log_id {
        args.push(related.clone());
        sql.push_str(&format!(" AND related_log_id = ?{}", args.len()));
    }
    if let Some(space_ids) = &query.space_ids {
        let placeholders: Vec<String> = space_ids
            .iter()
            .map(|id| {
                args.push(id.clone());
                format!("?{}", args.len())
            })
            .collect();
        sql.push_str(&format!(" AND space_id IN ({})", placeholders.join(", ")));
    }
    sql.push_str(if query.ascending {
        " ORDER BY created_at ASC, rowid ASC"
    } else {
        " ORDER BY created_at DESC, rowid DESC"
    });
    sql.push_str(&format!(" LIMIT {} OFFSET {}", query.limit, query.offset));

    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params_from_iter(args.iter()), log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Topics/tasks/logs changed at or after `since` (inclusive), for the
/// incremental sync endpoint.
pub fn changed_since(
    conn: &Connection,
    since: &str,
    limit: usize,
    include_raw: bool,
) -> Result<Vec<LogEntry>, StoreError> {
    let columns = if include_raw {
        LOG_COLUMNS
    } else {
        LOG_COLUMNS_SLIM
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {columns} FROM log_entry WHERE updated_at >= ?1
         ORDER BY updated_at DESC, created_at DESC, rowid DESC LIMIT {limit}"
    ))?;
    let entries = stmt
        .query_map([since], log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Notes attached to a log, oldest first.
pub fn notes_for(conn: &Connection, related_log_id: &str) -> Result<Vec<LogEntry>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOG_COLUMNS} FROM log_entry
         WHERE related_log_id = ?1 ORDER BY created_at ASC, rowid ASC"
    ))?;
    let entries = stmt
        .query_map([related_log_id], log_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Delete a log and its note children. Returns every removed id, root first.
pub fn delete_with_notes(conn: &Connection, id: &str) -> Result<Vec<String>, StoreError> {
    let mut removed = Vec::new();
    let root = conn.execute("DELETE FROM log_entry WHERE id = ?1", [id])?;
    if root == 0 {
        return Ok(removed);
    }
    removed.push(id.to_string());
    let mut stmt = conn.prepare("SELECT id FROM log_entry WHERE related_log_id = ?1")?;
    let children: Vec<String> = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    for child in children {
        conn.execute("DELETE FROM log_entry WHERE id = ?1", [&child])?;
        removed.push(child);
    }
    Ok(removed)
}

/// Ingestion/classifier health counters.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCounts {
    pub total: i64,
    pub pending: i64,
    pub classified: i64,
    pub failed: i64,
    pub newest_created_at: Option<String>,
    pub oldest_pending_created_at: Option<String>,
}

pub fn counts(conn: &Connection) -> Result<LogCounts, StoreError> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM log_entry", [], |r| r.get(0))?;
    let pending: i64 = conn.query_row(
        "SELECT COUNT(*) FROM log_entry WHERE classification_status = 'pending'",
        [],
        |r| r.get(0),
    )?;
    let failed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM log_entry WHERE classification_status = 'failed'",
        [],
        |r| r.get(0),
    )?;
    let newest: Option<String> =
        conn.query_row("SELECT MAX(created_at) FROM log_entry", [], |r| r.get(0))?;
    let oldest_pending: Option<String> = conn.query_row(
        "SELECT MIN(created_at) FROM log_entry WHERE classification_status = 'pending'",
        [],
        |r| r.get(0),
    )?;
    Ok(LogCounts {
        total,
        pending,
        classified: (total - pending - failed).max(0),
        failed,
        newest_created_at: newest,
        oldest_pending_created_at: oldest_pending,
    })
}

/// Reset derived associations and classifier state without deleting history
/// (administrative replay).
pub fn reset_for_replay(conn: &Connection, now: &str) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "UPDATE log_entry SET topic_id = NULL, task_id = NULL,
            classification_status = 'pending', classification_attempts = 0,
            classification_error = NULL, updated_at = ?1",
        [now],
    )?;
    Ok(changed)
}
