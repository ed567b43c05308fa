//! Bounded read-through cache over any embedding provider.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{EmbeddingError, EmbeddingProvider};

struct CacheState {
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

/// Caches embeddings by exact text, evicting the oldest entry at capacity.
pub struct CachedEmbedder<P> {
    inner: P,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl<P> CachedEmbedder<P> {
    pub fn new(inner: P, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbedder<P> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(hit) = self.state.lock().unwrap().entries.get(text) {
            return Ok(hit.clone());
        }
        let vector = self.inner.embed(text).await?;
        let mut state = self.state.lock().unwrap();
        if !state.entries.contains_key(text) {
            if state.order.len() >= self.capacity {
                if let Some(evicted) = state.order.pop_front() {
                    state.entries.remove(&evicted);
                }
            }
            state.order.push_back(text.to_string());
            state.entries.insert(text.to_string(), vector.clone());
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}
