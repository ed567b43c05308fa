//! HTTP embedder for OpenAI-compatible embedding endpoints.

use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{EmbeddingError, EmbeddingProvider};

/// Configuration for the HTTP embedder.
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// API base URL (e.g. "https://api.openai.com/v1").
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Bearer token, if the endpoint requires one.
    pub api_key: Option<SecretString>,
    /// Expected vector dimension.
    pub dimension: usize,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum attempts per lookup (transient failures back off between).
    pub max_attempts: u32,
}

impl HttpEmbedderConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            dimension,
            timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

/// Calls `POST {base_url}/embeddings` with the standard request shape.
pub struct HttpEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }
}

impl HttpEmbedder {
    async fn request_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.config.model,
            input: text,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EmbeddingError::Request(format!(
                "status {}",
                response.status()
            )));
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Malformed("empty data array".into()))?;
        if vector.is_empty() {
            return Err(EmbeddingError::Malformed("empty vector".into()));
        }
        debug!(len = vector.len(), "embedded text");
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.config.timeout),
            ..Default::default()
        };
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.request_once(text).await {
                Ok(vector) => return Ok(vector),
                // Malformed responses will not improve on retry.
                Err(err @ EmbeddingError::Malformed(_)) => return Err(err),
                Err(err) => {
                    if attempts >= self.config.max_attempts {
                        return Err(err);
                    }
                    match backoff.next_backoff() {
                        Some(pause) => {
                            warn!(error = %err, retry_in_ms = pause.as_millis() as u64, "embedding call failed, retrying");
                            tokio::time::sleep(pause).await;
                        }
                        None => return Err(err),
                    }
                }
            }
        }
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
