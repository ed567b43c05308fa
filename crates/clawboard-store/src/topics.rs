//! Topic queries.

use rusqlite::{params, Connection, OptionalExtension, Row};

use clawboard_types::{CreatedBy, Priority, Topic, TopicStatus};

use crate::error::StoreError;
use crate::json_column;

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get("id")?,
        space_id: row.get("space_id")?,
        name: row.get("name")?,
        created_by: json_column::parse_enum::<CreatedBy>(row.get::<_, String>("created_by")?),
        sort_index: row.get("sort_index")?,
        color: row.get("color")?,
        description: row.get("description")?,
        priority: json_column::parse_enum_opt::<Priority>(row.get("priority")?),
        status: json_column::parse_enum::<TopicStatus>(row.get::<_, String>("status")?),
        snoozed_until: row.get("snoozed_until")?,
        tags: json_column::from_json(row.get::<_, Option<String>>("tags")?),
        parent_id: row.get("parent_id")?,
        pinned: row.get("pinned")?,
        digest: row.get("digest")?,
        digest_updated_at: row.get("digest_updated_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const TOPIC_COLUMNS: &str = "id, space_id, name, created_by, sort_index, color, description, \
     priority, status, snoozed_until, tags, parent_id, pinned, digest, digest_updated_at, \
     created_at, updated_at";

pub fn insert(conn: &Connection, topic: &Topic) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO topic (id, space_id, name, created_by, sort_index, color, description,
            priority, status, snoozed_until, tags, parent_id, pinned, digest, digest_updated_at,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            topic.id,
            topic.space_id,
            topic.name,
            topic.created_by.to_string(),
            topic.sort_index,
            topic.color,
            topic.description,
            topic.priority.map(|p| p.to_string()),
            topic.status.to_string(),
            topic.snoozed_until,
            serde_json::to_string(&topic.tags)?,
            topic.parent_id,
            topic.pinned,
            topic.digest,
            topic.digest_updated_at,
            topic.created_at,
            topic.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, topic: &Topic) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE topic SET space_id = ?2, name = ?3, created_by = ?4, sort_index = ?5,
            color = ?6, description = ?7, priority = ?8, status = ?9, snoozed_until = ?10,
            tags = ?11, parent_id = ?12, pinned = ?13, digest = ?14, digest_updated_at = ?15,
            created_at = ?16, updated_at = ?17
         WHERE id = ?1",
        params![
            topic.id,
            topic.space_id,
            topic.name,
            topic.created_by.to_string(),
            topic.sort_index,
            topic.color,
            topic.description,
            topic.priority.map(|p| p.to_string()),
            topic.status.to_string(),
            topic.snoozed_until,
            serde_json::to_string(&topic.tags)?,
            topic.parent_id,
            topic.pinned,
            topic.digest,
            topic.digest_updated_at,
            topic.created_at,
            topic.updated_at,
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(topic.id.clone()));
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Topic>, StoreError> {
    let topic = conn
        .query_row(
            &format!("SELECT {TOPIC_COLUMNS} FROM topic WHERE id = ?1"),
            [id],
            topic_from_row,
        )
        .optional()?;
    Ok(topic)
}

/// All topics in display order: pinned first, then `sort_index` ascending,
/// then most recent activity first.
pub fn list(conn: &Connection) -> Result<Vec<Topic>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TOPIC_COLUMNS} FROM topic
         ORDER BY pinned DESC, sort_index ASC, updated_at DESC"
    ))?;
    let topics = stmt
        .query_map([], topic_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(topics)
}

pub fn list_in_spaces(conn: &Connection, space_ids: &[String]) -> Result<Vec<Topic>, StoreError> {
    Ok(list(conn)?
        .into_iter()
        .filter(|t| space_ids.contains(&t.space_id))
        .collect())
}

/// Delete a topic, detaching children instead of cascading: subtopics lose
/// their parent, tasks and logs lose their topic reference.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    conn.execute("UPDATE topic SET parent_id = NULL WHERE parent_id = ?1", [id])?;
    conn.execute("UPDATE task SET topic_id = NULL WHERE topic_id = ?1", [id])?;
    conn.execute(
        "UPDATE log_entry SET topic_id = NULL, task_id = NULL WHERE topic_id = ?1",
        [id],
    )?;
    let deleted = conn.execute("DELETE FROM topic WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

/// Sort index that places a new row at the top of its pinned group.
pub fn next_sort_index(conn: &Connection, pinned: bool) -> Result<i64, StoreError> {
    let min: Option<i64> = conn.query_row(
        "SELECT MIN(sort_index) FROM topic WHERE pinned = ?1",
        [pinned],
        |row| row.get(0),
    )?;
    Ok(min.map(|m| m - 1).unwrap_or(0))
}

/// Rewrite sort_index for the given ids (in order), leaving rows outside
/// the list in their existing slots.
pub fn reorder(conn: &Connection, ordered_ids: &[String], now: &str) -> Result<usize, StoreError> {
    let mut moved = 0;
    for (index, id) in ordered_ids.iter().enumerate() {
        moved += conn.execute(
            "UPDATE topic SET sort_index = ?1, updated_at = ?3 WHERE id = ?2",
            params![index as i64, id, now],
        )?;
    }
    Ok(moved)
}

/// Topics whose snooze has elapsed.
pub fn due_snoozed(conn: &Connection, now: &str) -> Result<Vec<Topic>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TOPIC_COLUMNS} FROM topic
         WHERE snoozed_until IS NOT NULL AND snoozed_until <= ?1"
    ))?;
    let topics = stmt
        .query_map([now], topic_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(topics)
}

pub fn used_colors(conn: &Connection) -> Result<std::collections::BTreeSet<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT color FROM topic WHERE color IS NOT NULL")?;
    let colors = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;
    Ok(colors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use clawboard_types::{create_id, now_iso};

    pub(crate) fn make_topic(name: &str) -> Topic {
        let now = now_iso();
        Topic {
            id: create_id("topic"),
            space_id: "space-default".into(),
            name: name.into(),
            created_by: CreatedBy::User,
            sort_index: 0,
            color: None,
            description: None,
            priority: None,
            status: TopicStatus::Active,
            snoozed_until: None,
            tags: vec![],
            parent_id: None,
            pinned: false,
            digest: None,
            digest_updated_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn insert_get_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let topic = make_topic("Infra");
        store.write(|conn| insert(conn, &topic)).unwrap();
        let loaded = store.read(|conn| get(conn, &topic.id)).unwrap().unwrap();
        assert_eq!(loaded.name, "Infra");
        assert_eq!(loaded.status, TopicStatus::Active);
    }

    #[test]
    fn list_orders_pinned_then_sort_index_then_recency() {
        let store = Store::open_in_memory().unwrap();
        let mut a = make_topic("a");
        a.sort_index = 5;
        let mut b = make_topic("b");
        b.pinned = true;
        b.sort_index = 9;
        let mut c = make_topic("c");
        c.sort_index = 1;
        store
            .write(|conn| {
                insert(conn, &a)?;
                insert(conn, &b)?;
                insert(conn, &c)
            })
            .unwrap();
        let names: Vec<String> = store
            .read(|conn| list(conn))
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn delete_detaches_children_without_cascade() {
        let store = Store::open_in_memory().unwrap();
        let parent = make_topic("parent");
        let mut child = make_topic("child");
        child.parent_id = Some(parent.id.clone());
        store
            .write(|conn| {
                insert(conn, &parent)?;
                insert(conn, &child)
            })
            .unwrap();
        assert!(store.write(|conn| delete(conn, &parent.id)).unwrap());
        let orphan = store.read(|conn| get(conn, &child.id)).unwrap().unwrap();
        assert!(orphan.parent_id.is_none());
    }

    #[test]
    fn new_rows_land_on_top_of_their_group() {
        let store = Store::open_in_memory().unwrap();
        let mut existing = make_topic("existing");
        existing.sort_index = -2;
        store.write(|conn| insert(conn, &existing)).unwrap();
        let next = store.read(|conn| next_sort_index(conn, false)).unwrap();
        assert_eq!(next, -3);
        assert_eq!(store.read(|conn| next_sort_index(conn, true)).unwrap(), 0);
    }
}
