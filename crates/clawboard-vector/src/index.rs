//! The vector index contract.

use async_trait::async_trait;

use crate::error::VectorError;

/// Which kind namespace a top-k query targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindSelector {
    /// Exactly one kind, e.g. `topic` or `task:<topicId>`.
    Exact(String),
    /// Every kind sharing a prefix, e.g. `task:` across all topics.
    Prefix(String),
}

impl KindSelector {
    pub fn matches(&self, kind: &str) -> bool {
        match self {
            KindSelector::Exact(exact) => kind == exact,
            KindSelector::Prefix(prefix) => kind.starts_with(prefix.as_str()),
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
}

/// Upsert/delete/top-k over `(kind, id) → vector` points. Cosine similarity
/// is the metric.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, kind: &str, id: &str, vector: &[f32]) -> Result<(), VectorError>;

    async fn delete(&self, kind: &str, id: &str) -> Result<(), VectorError>;

    async fn topk(
        &self,
        selector: &KindSelector,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matching() {
        assert!(KindSelector::Exact("topic".into()).matches("topic"));
        assert!(!KindSelector::Exact("topic".into()).matches("task:topic-1"));
        assert!(KindSelector::Prefix("task:".into()).matches("task:topic-1"));
        assert!(!KindSelector::Prefix("task:".into()).matches("topic"));
    }
}
