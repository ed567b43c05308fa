//! External chat gateway client.
//!
//! Clawboard never talks to the model directly for chat; it relays user
//! messages to the OpenClaw gateway and lets ingestion capture the replies.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenClawConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

pub struct OpenClawGateway {
    client: Client,
    config: OpenClawConfig,
}

#[derive(Debug, thiserror::Error)]
#[error("chat gateway error: {0}")]
pub struct GatewayError(pub String);

impl OpenClawGateway {
    pub fn new(config: OpenClawConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Dispatch one user message into a session thread.
    pub async fn dispatch(
        &self,
        request_id: &str,
        session_key: &str,
        agent_id: &str,
        message: &str,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/v1/sessions/send", self.config.base_url.trim_end_matches('/'));
        let response = self
            .request(self.client.post(&url))
            .json(&json!({
                "requestId": request_id,
                "sessionKey": session_key,
                "agentId": agent_id,
                "message": message,
            }))
            .send()
            .await
            .map_err(|e| GatewayError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError(format!("status {}", response.status())));
        }
        debug!(request_id, session_key, "dispatched chat message");
        Ok(())
    }

    /// Ask the gateway to abort an in-flight request.
    pub async fn abort(&self, request_id: &str) -> Result<(), GatewayError> {
        let url = format!("{}/v1/sessions/abort", self.config.base_url.trim_end_matches('/'));
        let response = self
            .request(self.client.post(&url))
            .json(&json!({ "requestId": request_id }))
            .send()
            .await
            .map_err(|e| GatewayError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError(format!("status {}", response.status())));
        }
        Ok(())
    }
}
