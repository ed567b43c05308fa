//! LLM client for classification and summary repair.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use clawboard_types::{clip, sanitize_log_text, LogEntry, RoutingDecision};

use crate::error::ClassifierError;

/// One window turn as presented to the model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowItem {
    pub id: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub content: String,
}

impl WindowItem {
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            id: entry.id.clone(),
            created_at: entry.created_at.clone(),
            agent_label: entry
                .agent_label
                .clone()
                .or_else(|| entry.agent_id.clone()),
            summary: entry.summary.clone(),
            content: clip(&sanitize_log_text(&entry.content), 800),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTopic {
    pub id: String,
    pub name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTask {
    pub id: String,
    pub title: String,
    pub score: f32,
}

/// Everything the model sees for one bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyPrompt {
    pub window: Vec<WindowItem>,
    pub candidate_topics: Vec<CandidateTopic>,
    pub candidate_tasks: Vec<CandidateTask>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routing_memory: Vec<RoutingDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuity_hint: Option<String>,
    pub instructions: String,
}

pub fn classify_instructions() -> String {
    concat!(
        "Return STRICT JSON only with shape: ",
        r#"{"topic": {"id": string|null, "name": string, "create": boolean}, "#,
        r#""task": {"id": string|null, "title": string|null, "create": boolean}|null, "#,
        r#""summaries": [{"id": string, "summary": string}]}. "#,
        "Rules: (1) Prefer existing topics/tasks when they clearly match; ",
        "(2) Only create when needed; (3) Topic/task names must be short and human; ",
        "(4) If in doubt, return task=null; ",
        "(5) Provide one summary per window item, at most 56 characters each."
    )
    .to_string()
}

/// The model capability the classifier worker consumes.
#[async_trait]
pub trait ClassifierLlm: Send + Sync {
    /// Run the classification call; `repair_hint` carries the validation
    /// failure from the previous attempt, if any.
    async fn classify(
        &self,
        prompt: &ClassifyPrompt,
        repair_hint: Option<&str>,
    ) -> Result<String, ClassifierError>;

    /// One-shot summary repair for a single log text.
    async fn summarize(&self, text: &str) -> Result<String, ClassifierError>;
}

#[derive(Debug, Clone)]
pub struct HttpLlmConfig {
    pub base_url: String,
    pub model: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl HttpLlmConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            token: None,
            timeout: Duration::from_secs(75),
        }
    }
}

/// OpenAI-compatible chat-completions client.
pub struct HttpLlm {
    client: Client,
    config: HttpLlmConfig,
}

impl HttpLlm {
    pub fn new(config: HttpLlmConfig) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Llm(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn chat(&self, system: &str, user: String, max_tokens: u32) -> Result<String, ClassifierError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut request = self.client.post(&url).json(&json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0,
            "max_tokens": max_tokens,
        }));
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ClassifierError::LlmTimeout
            } else {
                ClassifierError::Llm(err.to_string())
            }
        })?;
        if !response.status().is_success() {
            return Err(ClassifierError::Llm(format!("status {}", response.status())));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::Llm(e.to_string()))?;
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| ClassifierError::Llm("missing choices[0].message.content".into()))?;
        debug!(len = content.len(), "llm reply received");
        Ok(content.to_string())
    }
}

#[async_trait]
impl ClassifierLlm for HttpLlm {
    async fn classify(
        &self,
        prompt: &ClassifyPrompt,
        repair_hint: Option<&str>,
    ) -> Result<String, ClassifierError> {
        let mut body = serde_json::to_value(prompt)
            .map_err(|e| ClassifierError::Llm(e.to_string()))?;
        if let Some(hint) = repair_hint {
            body["repairHint"] = json!(format!(
                "Previous reply failed validation: {hint}. Return STRICT JSON only."
            ));
        }
        self.chat(
            "You are a high-precision classifier for an ops dashboard. STRICT JSON only.",
            body.to_string(),
            600,
        )
        .await
    }

    async fn summarize(&self, text: &str) -> Result<String, ClassifierError> {
        let reply = self
            .chat(
                "Summarize the message in at most 56 characters. Reply with the summary only.",
                clip(text, 1200),
                80,
            )
            .await?;
        Ok(clip(sanitize_log_text(&reply).as_str(), 56))
    }
}

/// Scripted model double for tests and offline cycles.
pub struct ScriptedLlm {
    replies: std::sync::Mutex<std::collections::VecDeque<Result<String, ClassifierError>>>,
    pub summaries: HashMap<String, String>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String, ClassifierError>>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into()),
            summaries: HashMap::new(),
        }
    }
}

#[async_trait]
impl ClassifierLlm for ScriptedLlm {
    async fn classify(
        &self,
        _prompt: &ClassifyPrompt,
        _repair_hint: Option<&str>,
    ) -> Result<String, ClassifierError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ClassifierError::Llm("script exhausted".into())))
    }

    async fn summarize(&self, text: &str) -> Result<String, ClassifierError> {
        match self.summaries.get(text) {
            Some(summary) => Ok(summary.clone()),
            None => Ok(clip(text, 56)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prompt() -> ClassifyPrompt {
        ClassifyPrompt {
            window: vec![],
            candidate_topics: vec![],
            candidate_tasks: vec![],
            routing_memory: vec![],
            continuity_hint: None,
            instructions: classify_instructions(),
        }
    }

    #[tokio::test]
    async fn classify_extracts_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "{\"topic\":{\"id\":null,\"name\":\"Ops\",\"create\":true},\"task\":null}" } }]
            })))
            .mount(&server)
            .await;

        let llm = HttpLlm::new(HttpLlmConfig::new(server.uri(), "test-model")).unwrap();
        let reply = llm.classify(&prompt(), None).await.unwrap();
        assert!(reply.contains("\"Ops\""));
    }

    #[tokio::test]
    async fn server_errors_surface_as_llm_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let llm = HttpLlm::new(HttpLlmConfig::new(server.uri(), "test-model")).unwrap();
        assert!(matches!(
            llm.classify(&prompt(), None).await,
            Err(ClassifierError::Llm(_))
        ));
    }

    #[tokio::test]
    async fn slow_responses_become_timeouts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(300))
                    .set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;
        let mut config = HttpLlmConfig::new(server.uri(), "test-model");
        config.timeout = Duration::from_millis(50);
        let llm = HttpLlm::new(config).unwrap();
        assert!(matches!(
            llm.classify(&prompt(), None).await,
            Err(ClassifierError::LlmTimeout)
        ));
    }
}
