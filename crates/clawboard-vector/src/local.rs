//! Local SQLite-backed vector store with brute-force cosine top-k.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::debug;

use clawboard_embeddings::cosine_similarity;
use clawboard_types::now_iso;

use crate::error::VectorError;
use crate::index::{KindSelector, ScoredPoint, VectorIndex};

/// Vectors live in one table keyed by `(kind, id)`, stored as little-endian
/// `f32` blobs. A scan is adequate for board-scale candidate sets; the
/// remote service takes over when volumes outgrow it.
pub struct LocalVectorIndex {
    conn: Mutex<Connection>,
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8], dim: usize) -> Vec<f32> {
    blob.chunks_exact(4)
        .take(dim)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl LocalVectorIndex {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VectorError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, VectorError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, VectorError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS embeddings (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                vector BLOB NOT NULL,
                dim INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );
            CREATE INDEX IF NOT EXISTS ix_embeddings_kind ON embeddings (kind);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Every `(kind, id)` pair currently present (maintenance reconcile).
    pub fn list_points(&self) -> Result<Vec<(String, String)>, VectorError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT kind, id FROM embeddings")?;
        let points = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    pub fn count(&self) -> Result<usize, VectorError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn upsert(&self, kind: &str, id: &str, vector: &[f32]) -> Result<(), VectorError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO embeddings (kind, id, vector, dim, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (kind, id) DO UPDATE SET vector = ?3, dim = ?4, updated_at = ?5",
            params![kind, id, vector_to_blob(vector), vector.len() as i64, now_iso()],
        )?;
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<(), VectorError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM embeddings WHERE kind = ?1 AND id = ?2",
            params![kind, id],
        )?;
        Ok(())
    }

    async fn topk(
        &self,
        selector: &KindSelector,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let (sql, pattern) = match selector {
            KindSelector::Exact(kind) => (
                "SELECT id, vector, dim FROM embeddings WHERE kind = ?1",
                kind.clone(),
            ),
            KindSelector::Prefix(prefix) => (
                "SELECT id, vector, dim FROM embeddings WHERE kind LIKE ?1",
                format!("{prefix}%"),
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let mut ranked: Vec<ScoredPoint> = Vec::new();
        let rows = stmt.query_map([pattern], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (id, blob, dim) = row?;
            let vector = blob_to_vector(&blob, dim as usize);
            let score = cosine_similarity(query, &vector);
            ranked.push(ScoredPoint { id, score });
        }
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        // An id can appear under several kinds with a prefix selector; keep
        // the best score per id.
        let mut seen = std::collections::HashSet::new();
        ranked.retain(|point| seen.insert(point.id.clone()));
        ranked.truncate(limit);
        debug!(results = ranked.len(), "local topk scan");
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_topk_finds_nearest() {
        let index = LocalVectorIndex::open_in_memory().unwrap();
        index.upsert("topic", "t1", &[1.0, 0.0]).await.unwrap();
        index.upsert("topic", "t2", &[0.0, 1.0]).await.unwrap();
        let hits = index
            .topk(&KindSelector::Exact("topic".into()), &[0.9, 0.1], 2)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "t1");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn prefix_selector_spans_topic_scoped_tasks() {
        let index = LocalVectorIndex::open_in_memory().unwrap();
        index.upsert("task:topic-1", "k1", &[1.0, 0.0]).await.unwrap();
        index.upsert("task:topic-2", "k2", &[0.8, 0.2]).await.unwrap();
        index.upsert("topic", "t1", &[1.0, 0.0]).await.unwrap();
        let hits = index
            .topk(&KindSelector::Prefix("task:".into()), &[1.0, 0.0], 10)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn delete_removes_point() {
        let index = LocalVectorIndex::open_in_memory().unwrap();
        index.upsert("log", "l1", &[1.0]).await.unwrap();
        index.delete("log", "l1").await.unwrap();
        assert_eq!(index.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_vector() {
        let index = LocalVectorIndex::open_in_memory().unwrap();
        index.upsert("topic", "t1", &[1.0, 0.0]).await.unwrap();
        index.upsert("topic", "t1", &[0.0, 1.0]).await.unwrap();
        assert_eq!(index.count().unwrap(), 1);
        let hits = index
            .topk(&KindSelector::Exact("topic".into()), &[0.0, 1.0], 1)
            .await
            .unwrap();
        assert!(hits[0].score > 0.99);
    }
}
