//! Space queries and visibility resolution.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension, Row};

use clawboard_types::Space;

use crate::error::StoreError;
use crate::json_column;

fn space_from_row(row: &Row<'_>) -> rusqlite::Result<Space> {
    Ok(Space {
        id: row.get("id")?,
        name: row.get("name")?,
        color: row.get("color")?,
        default_visible: row.get("default_visible")?,
        connectivity: json_column::from_json::<BTreeMap<String, bool>>(row.get("connectivity")?),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SPACE_COLUMNS: &str =
    "id, name, color, default_visible, connectivity, created_at, updated_at";

pub fn upsert(conn: &Connection, space: &Space) -> Result<(), StoreError> {
    let mut normalized = space.clone();
    normalized.normalize_connectivity();
    conn.execute(
        "INSERT INTO space (id, name, color, default_visible, connectivity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (id) DO UPDATE SET
            name = ?2, color = ?3, default_visible = ?4, connectivity = ?5, updated_at = ?7",
        params![
            normalized.id,
            normalized.name,
            normalized.color,
            normalized.default_visible,
            json_column::to_json(&normalized.connectivity)?,
            normalized.created_at,
            normalized.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Space>, StoreError> {
    let space = conn
        .query_row(
            &format!("SELECT {SPACE_COLUMNS} FROM space WHERE id = ?1"),
            [id],
            space_from_row,
        )
        .optional()?;
    Ok(space)
}

pub fn list(conn: &Connection) -> Result<Vec<Space>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {SPACE_COLUMNS} FROM space ORDER BY created_at"))?;
    let spaces = stmt
        .query_map([], space_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(spaces)
}

/// Space ids visible from `space_id`, computed from explicit edges only.
pub fn allowed_space_ids(conn: &Connection, space_id: &str) -> Result<Vec<String>, StoreError> {
    match get(conn, space_id)? {
        Some(space) => Ok(space.allowed_space_ids()),
        None => Err(StoreError::NotFound(space_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use clawboard_types::now_iso;

    #[test]
    fn default_space_is_seeded() {
        let store = Store::open_in_memory().unwrap();
        let space = store
            .read(|conn| get(conn, "space-default"))
            .unwrap()
            .unwrap();
        assert_eq!(space.name, "Default");
        assert!(space.connectivity.is_empty());
    }

    #[test]
    fn upsert_normalizes_connectivity() {
        let store = Store::open_in_memory().unwrap();
        let now = now_iso();
        let mut space = Space {
            id: "space-ops".into(),
            name: "Ops".into(),
            color: None,
            default_visible: true,
            connectivity: BTreeMap::new(),
            created_at: now.clone(),
            updated_at: now,
        };
        space.connectivity.insert("space-ops".into(), true);
        space.connectivity.insert("space-default".into(), true);
        store.write(|conn| upsert(conn, &space)).unwrap();
        let loaded = store.read(|conn| get(conn, "space-ops")).unwrap().unwrap();
        assert!(!loaded.connectivity.contains_key("space-ops"));
        let allowed = store
            .read(|conn| allowed_space_ids(conn, "space-ops"))
            .unwrap();
        assert_eq!(
            allowed,
            vec!["space-ops".to_string(), "space-default".to_string()]
        );
    }
}
