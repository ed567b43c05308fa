//! Connection handling and the busy-retry wrapper.
//!
//! The store is the single authority for all mutable state. Each call opens
//! a short-lived connection (request-scoped session); writers that collide
//! on the shared file retry transient busy errors with exponential backoff.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::schema;

/// Busy-retry budget: up to six attempts, at most ~750 ms of sleeping.
const RETRY_ATTEMPTS: u32 = 6;
const RETRY_TOTAL: Duration = Duration::from_millis(750);
const BUSY_TIMEOUT: Duration = Duration::from_secs(3);

enum Target {
    File(PathBuf),
    /// Shared-cache in-memory database. The anchor connection keeps it
    /// alive for the lifetime of the store; without it every short-lived
    /// session would see a fresh empty database.
    Memory {
        uri: String,
        _anchor: Mutex<Connection>,
    },
}

/// Handle to the Clawboard database.
pub struct Store {
    target: Target,
}

impl Store {
    /// Open (and migrate) the database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Serialization(format!("create {}: {e}", parent.display()))
                })?;
            }
        }
        info!(path = %path.display(), "opening store");
        let store = Self {
            target: Target::File(path),
        };
        let conn = store.connect()?;
        schema::migrate(&conn)?;
        Ok(store)
    }

    /// Open an isolated in-memory database (tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let uri = format!("file:clawboard-{}?mode=memory&cache=shared", Uuid::new_v4());
        let anchor = Connection::open_with_flags(
            &uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        let store = Self {
            target: Target::Memory {
                uri,
                _anchor: Mutex::new(anchor),
            },
        };
        let conn = store.connect()?;
        schema::migrate(&conn)?;
        Ok(store)
    }

    /// Open a fresh session connection with the standard pragmas applied.
    pub fn connect(&self) -> Result<Connection, StoreError> {
        let conn = match &self.target {
            Target::File(path) => Connection::open(path)?,
            Target::Memory { uri, .. } => Connection::open_with_flags(
                uri,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        if matches!(self.target, Target::File(_)) {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Run a read-only closure on a session connection.
    pub fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Run a write closure, retrying transient busy errors with capped
    /// exponential backoff. Uniqueness violations surface immediately so
    /// idempotency conflicts can be resolved by the caller.
    pub fn write<T>(
        &self,
        mut f: impl FnMut(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.connect()?;
        let mut slept = Duration::ZERO;
        for attempt in 0..RETRY_ATTEMPTS {
            match f(&conn) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_duplicate() => return Err(err),
                Err(err) if err.is_busy() && attempt + 1 < RETRY_ATTEMPTS => {
                    let backoff = Duration::from_millis(50u64 << attempt);
                    let remaining = RETRY_TOTAL.saturating_sub(slept);
                    if remaining.is_zero() {
                        warn!(attempt, "store busy, retry budget exhausted");
                        return Err(StoreError::Busy { attempts: attempt + 1 });
                    }
                    let pause = backoff.min(remaining);
                    debug!(attempt, pause_ms = pause.as_millis() as u64, "store busy, backing off");
                    std::thread::sleep(pause);
                    slept += pause;
                }
                Err(err) if err.is_busy() => {
                    return Err(StoreError::Busy {
                        attempts: RETRY_ATTEMPTS,
                    })
                }
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::Busy {
            attempts: RETRY_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_survives_across_sessions() {
        let store = Store::open_in_memory().unwrap();
        store
            .write(|conn| {
                conn.execute("CREATE TABLE probe (id INTEGER)", [])?;
                conn.execute("INSERT INTO probe (id) VALUES (1)", [])?;
                Ok(())
            })
            .unwrap();
        let count: i64 = store
            .read(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM probe", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn duplicate_errors_bypass_retry() {
        let store = Store::open_in_memory().unwrap();
        store
            .write(|conn| {
                conn.execute("CREATE TABLE uniq (id TEXT PRIMARY KEY)", [])?;
                conn.execute("INSERT INTO uniq (id) VALUES ('a')", [])?;
                Ok(())
            })
            .unwrap();
        let err = store
            .write(|conn| {
                conn.execute("INSERT INTO uniq (id) VALUES ('a')", [])?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn file_store_opens_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/clawboard.db");
        let store = Store::open(&path).unwrap();
        // Schema bootstrap seeds the default space.
        let name: String = store
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT name FROM space WHERE id = 'space-default'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(name, "Default");
    }
}
