//! Optional reranking stage.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::SearchError;

/// External rerank capability over `(id, text)` candidates.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[(String, String)],
    ) -> Result<HashMap<String, f32>, SearchError>;
}

/// Blend the dense/lexical base with a reranker score.
///
/// `alpha` is the reranker weight (environment-tunable); the base is the
/// `0.72·vector + 0.28·lexical` hybrid.
pub fn blend(vector: f32, lexical: f32, rerank: Option<f32>, alpha: f32) -> f32 {
    let base = vector * 0.72 + lexical * 0.28;
    match rerank {
        Some(score) => base * (1.0 - alpha) + score * alpha,
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_without_reranker_is_the_hybrid_base() {
        let score = blend(0.5, 0.5, None, 0.4);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn blend_moves_toward_rerank_score_with_alpha() {
        let base_only = blend(0.8, 0.2, None, 0.5);
        let lifted = blend(0.8, 0.2, Some(1.0), 0.5);
        let damped = blend(0.8, 0.2, Some(0.0), 0.5);
        assert!(lifted > base_only);
        assert!(damped < base_only);
    }
}
