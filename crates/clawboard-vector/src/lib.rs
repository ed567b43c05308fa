//! # clawboard-vector
//!
//! Vector storage and retrieval for `(kind, id) → vector` points.
//!
//! The default backend mirrors every vector into a local SQLite file and
//! scans for cosine top-k. An optional Qdrant remote takes over search when
//! configured; the local mirror is always written and serves as fallback
//! when the remote errors.
//!
//! Kind namespaces: `topic`, `task:<topicId>` (task candidates stay
//! topic-scoped), `log`.
//!
//! The reindex queue is an append-only JSON-Lines file of upsert/delete
//! intents; the maintenance pass reconciles the index against live store
//! rows.

mod error;
mod index;
mod local;
mod maintenance;
mod mirrored;
mod qdrant;
mod reindex;

pub use error::VectorError;
pub use index::{KindSelector, ScoredPoint, VectorIndex};
pub use local::LocalVectorIndex;
pub use maintenance::{run_maintenance, MaintenanceReport};
pub use mirrored::MirroredIndex;
pub use qdrant::{point_uuid, QdrantClient, QdrantConfig};
pub use reindex::{ReindexOp, ReindexQueue, ReindexRequest};
