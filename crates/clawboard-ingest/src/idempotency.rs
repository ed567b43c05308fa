//! Idempotency key resolution.
//!
//! Priority order: header value, payload field, then a key synthesized from
//! the source message identity for legacy producers that send neither.

use clawboard_types::LogAppend;

/// Resolve the effective idempotency key for an append.
pub fn resolve_key(payload: &LogAppend, header_key: Option<&str>) -> Option<String> {
    if let Some(key) = header_key.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    if let Some(key) = payload
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(key.to_string());
    }
    let source = payload.source.as_ref()?;
    let message_id = source.message_id.as_deref()?.trim();
    if message_id.is_empty() {
        return None;
    }
    let channel = source
        .channel
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    let actor = payload
        .agent_id
        .as_deref()
        .or(payload.agent_label.as_deref())
        .unwrap_or("")
        .trim()
        .to_lowercase();
    let entry_type = payload
        .log_type
        .map(|t| t.to_string())
        .unwrap_or_default();
    Some(format!("src:{entry_type}:{channel}:{actor}:{message_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawboard_types::{LogSource, LogType};

    fn payload_with_source(message_id: Option<&str>) -> LogAppend {
        LogAppend {
            log_type: Some(LogType::Conversation),
            agent_id: Some("Assistant".into()),
            source: Some(LogSource {
                channel: Some("Discord".into()),
                message_id: message_id.map(|s| s.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn header_wins_over_payload_and_source() {
        let mut payload = payload_with_source(Some("m1"));
        payload.idempotency_key = Some("payload-key".into());
        assert_eq!(
            resolve_key(&payload, Some(" header-key ")).as_deref(),
            Some("header-key")
        );
    }

    #[test]
    fn payload_key_wins_over_synthesized() {
        let mut payload = payload_with_source(Some("m1"));
        payload.idempotency_key = Some("payload-key".into());
        assert_eq!(resolve_key(&payload, None).as_deref(), Some("payload-key"));
    }

    #[test]
    fn legacy_key_is_synthesized_from_source_identity() {
        let payload = payload_with_source(Some("m1"));
        assert_eq!(
            resolve_key(&payload, None).as_deref(),
            Some("src:conversation:discord:assistant:m1")
        );
    }

    #[test]
    fn no_message_id_means_no_key() {
        assert!(resolve_key(&payload_with_source(None), None).is_none());
        assert!(resolve_key(&LogAppend::default(), None).is_none());
        assert!(resolve_key(&LogAppend::default(), Some("  ")).is_none());
    }
}
