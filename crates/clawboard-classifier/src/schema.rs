//! Strict validation of the LLM classification response.
//!
//! The accepted shape is exactly:
//! `{"topic": {"id": string|null, "name": string, "create": bool},
//!   "task": {"id": string|null, "title": string|null, "create": bool} | null,
//!   "summaries": [{"id": string, "summary": string}]}`
//!
//! Wrong-type fields and unknown keys are rejected; the caller gets one
//! repair attempt before falling back to the deterministic classifier.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ClassifierError;

#[derive(Debug, Clone, PartialEq)]
pub struct TopicChoice {
    pub id: Option<String>,
    pub name: String,
    pub create: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskChoice {
    pub id: Option<String>,
    pub title: Option<String>,
    pub create: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub topic: TopicChoice,
    pub task: Option<TaskChoice>,
    /// Per-log summaries keyed by log id.
    pub summaries: HashMap<String, String>,
}

fn invalid(message: impl Into<String>) -> ClassifierError {
    ClassifierError::InvalidResponse(message.into())
}

fn as_object<'a>(
    value: &'a Value,
    context: &str,
    allowed: &[&str],
) -> Result<&'a serde_json::Map<String, Value>, ClassifierError> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid(format!("{context} must be an object")))?;
    for key in object.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid(format!("{context} has unknown key '{key}'")));
        }
    }
    Ok(object)
}

fn opt_string(value: Option<&Value>, context: &str) -> Result<Option<String>, ClassifierError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone()).filter(|s| !s.trim().is_empty())),
        Some(_) => Err(invalid(format!("{context} must be a string or null"))),
    }
}

fn required_bool(value: Option<&Value>, context: &str) -> Result<bool, ClassifierError> {
    value
        .and_then(Value::as_bool)
        .ok_or_else(|| invalid(format!("{context} must be a boolean")))
}

/// Parse the raw model output into a validated [`Decision`].
pub fn parse_decision(raw: &str) -> Result<Decision, ClassifierError> {
    let trimmed = raw.trim();
    // Models occasionally wrap JSON in a code fence despite instructions.
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    let root = as_object(&value, "response", &["topic", "task", "summaries"])?;

    let topic_value = root
        .get("topic")
        .ok_or_else(|| invalid("response is missing 'topic'"))?;
    let topic_map = as_object(topic_value, "topic", &["id", "name", "create"])?;
    let name = match topic_map.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(invalid("topic.name must be a non-empty string")),
    };
    let topic = TopicChoice {
        id: opt_string(topic_map.get("id"), "topic.id")?,
        name,
        create: required_bool(topic_map.get("create"), "topic.create")?,
    };

    let task = match root.get("task") {
        None | Some(Value::Null) => None,
        Some(task_value) => {
            let task_map = as_object(task_value, "task", &["id", "title", "create"])?;
            Some(TaskChoice {
                id: opt_string(task_map.get("id"), "task.id")?,
                title: opt_string(task_map.get("title"), "task.title")?,
                create: required_bool(task_map.get("create"), "task.create")?,
            })
        }
    };

    let mut summaries = HashMap::new();
    match root.get("summaries") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let map = as_object(item, "summaries[]", &["id", "summary"])?;
                let id = match map.get("id") {
                    Some(Value::String(id)) if !id.is_empty() => id.clone(),
                    _ => return Err(invalid("summaries[].id must be a string")),
                };
                let summary = match map.get("summary") {
                    Some(Value::String(summary)) => summary.clone(),
                    _ => return Err(invalid("summaries[].summary must be a string")),
                };
                summaries.insert(id, summary);
            }
        }
        Some(_) => return Err(invalid("summaries must be an array")),
    }

    Ok(Decision {
        topic,
        task,
        summaries,
    })
}
