//! Qdrant HTTP client for the optional remote vector service.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::VectorError;
use crate::index::ScoredPoint;

/// Stable point identity in the external service: UUIDv5 over
/// `clawboard:<kind>:<id>` so re-upserts always hit the same point.
pub fn point_uuid(kind: &str, id: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("clawboard:{kind}:{id}").as_bytes(),
    )
}

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
    pub api_key: Option<SecretString>,
    pub dimension: usize,
    pub timeout: Duration,
}

pub struct QdrantClient {
    client: Client,
    config: QdrantConfig,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    payload: Option<serde_json::Value>,
}

impl QdrantClient {
    pub fn new(config: QdrantConfig) -> Result<Self, VectorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VectorError::Remote(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.config.url.trim_end_matches('/'),
            self.config.collection,
            suffix
        )
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.header("api-key", key.expose_secret()),
            None => builder,
        }
    }

    /// Create the collection if missing. Safe to call on every startup.
    pub async fn ensure_collection(&self) -> Result<(), VectorError> {
        let exists = self
            .request(self.client.get(self.url("")))
            .send()
            .await
            .map_err(|e| VectorError::Remote(e.to_string()))?;
        if exists.status().is_success() {
            return Ok(());
        }
        let response = self
            .request(self.client.put(self.url("")))
            .json(&json!({
                "vectors": { "size": self.config.dimension, "distance": "Cosine" }
            }))
            .send()
            .await
            .map_err(|e| VectorError::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorError::Remote(format!(
                "create collection: status {}",
                response.status()
            )));
        }
        debug!(collection = %self.config.collection, "created qdrant collection");
        Ok(())
    }

    pub async fn upsert(&self, kind: &str, id: &str, vector: &[f32]) -> Result<(), VectorError> {
        let response = self
            .request(self.client.put(self.url("/points")))
            .json(&json!({
                "points": [{
                    "id": point_uuid(kind, id).to_string(),
                    "vector": vector,
                    "payload": { "kind": kind, "id": id },
                }]
            }))
            .send()
            .await
            .map_err(|e| VectorError::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorError::Remote(format!(
                "upsert: status {}",
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, kind: &str, id: &str) -> Result<(), VectorError> {
        self.delete_batch(&[(kind.to_string(), id.to_string())]).await
    }

    /// Batched point deletion used by index maintenance.
    pub async fn delete_batch(&self, points: &[(String, String)]) -> Result<(), VectorError> {
        if points.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = points
            .iter()
            .map(|(kind, id)| point_uuid(kind, id).to_string())
            .collect();
        let response = self
            .request(self.client.post(self.url("/points/delete")))
            .json(&json!({ "points": ids }))
            .send()
            .await
            .map_err(|e| VectorError::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorError::Remote(format!(
                "delete: status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Search one kind namespace (exact match or prefix via payload filter).
    pub async fn search(
        &self,
        kind_exact: Option<&str>,
        kind_prefix: Option<&str>,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        let filter = if let Some(kind) = kind_exact {
            json!({ "must": [{ "key": "kind", "match": { "value": kind } }] })
        } else if let Some(prefix) = kind_prefix {
            json!({ "must": [{ "key": "kind", "match": { "text": prefix } }] })
        } else {
            serde_json::Value::Null
        };
        let mut body = json!({
            "vector": query,
            "limit": limit,
            "with_payload": true,
        });
        if !filter.is_null() {
            body["filter"] = filter;
        }
        let response = self
            .request(self.client.post(self.url("/points/search")))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorError::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(VectorError::Remote(format!(
                "search: status {}",
                response.status()
            )));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| VectorError::Remote(e.to_string()))?;
        let mut points = Vec::new();
        for hit in parsed.result {
            let Some(payload) = hit.payload else {
                warn!("qdrant hit without payload, skipping");
                continue;
            };
            let Some(id) = payload.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            points.push(ScoredPoint {
                id: id.to_string(),
                score: hit.score,
            });
        }
        Ok(points)
    }
}
