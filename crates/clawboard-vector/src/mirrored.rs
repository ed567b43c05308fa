//! Composite index: local mirror always written, remote preferred for
//! search with local fallback.

use async_trait::async_trait;
use tracing::warn;

use crate::error::VectorError;
use crate::index::{KindSelector, ScoredPoint, VectorIndex};
use crate::local::LocalVectorIndex;
use crate::qdrant::QdrantClient;

pub struct MirroredIndex {
    local: LocalVectorIndex,
    remote: Option<QdrantClient>,
}

impl MirroredIndex {
    pub fn new(local: LocalVectorIndex, remote: Option<QdrantClient>) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &LocalVectorIndex {
        &self.local
    }

    pub fn remote(&self) -> Option<&QdrantClient> {
        self.remote.as_ref()
    }
}

#[async_trait]
impl VectorIndex for MirroredIndex {
    async fn upsert(&self, kind: &str, id: &str, vector: &[f32]) -> Result<(), VectorError> {
        // The mirror is the durable copy; remote failures degrade search
        // quality, not correctness.
        self.local.upsert(kind, id, vector).await?;
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.upsert(kind, id, vector).await {
                warn!(kind, id, error = %err, "remote upsert failed, mirror retained");
            }
        }
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<(), VectorError> {
        self.local.delete(kind, id).await?;
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.delete(kind, id).await {
                warn!(kind, id, error = %err, "remote delete failed, mirror updated");
            }
        }
        Ok(())
    }

    async fn topk(
        &self,
        selector: &KindSelector,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        if let Some(remote) = &self.remote {
            let (exact, prefix) = match selector {
                KindSelector::Exact(kind) => (Some(kind.as_str()), None),
                KindSelector::Prefix(prefix) => (None, Some(prefix.as_str())),
            };
            match remote.search(exact, prefix, query, limit).await {
                Ok(points) => return Ok(points),
                Err(err) => {
                    warn!(error = %err, "remote search failed, falling back to mirror");
                }
            }
        }
        self.local.topk(selector, query, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_remote_uses_local_scan() {
        let index = MirroredIndex::new(LocalVectorIndex::open_in_memory().unwrap(), None);
        index.upsert("topic", "t1", &[1.0, 0.0]).await.unwrap();
        let hits = index
            .topk(&KindSelector::Exact("topic".into()), &[1.0, 0.0], 1)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "t1");
    }
}
