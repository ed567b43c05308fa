//! Per-session routing memory: recent classification decisions used for
//! low-signal continuity.

use serde::{Deserialize, Serialize};

/// Default cap for items retained per session.
pub const DEFAULT_MAX_ITEMS: usize = 8;

/// One recorded classification decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub ts: String,
    pub topic_id: String,
    pub topic_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    /// The user turn that anchored the decision.
    pub anchor: String,
}

/// Bounded list of recent decisions for one session key, newest last.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRoutingMemory {
    pub session_key: String,
    #[serde(default)]
    pub items: Vec<RoutingDecision>,
    pub updated_at: String,
}

impl SessionRoutingMemory {
    /// Append a decision, dropping the oldest entries past `max_items`.
    pub fn push(&mut self, decision: RoutingDecision, max_items: usize) {
        self.items.push(decision);
        let cap = max_items.max(1);
        if self.items.len() > cap {
            let excess = self.items.len() - cap;
            self.items.drain(..excess);
        }
    }

    /// Most recent decision, if any.
    pub fn latest(&self) -> Option<&RoutingDecision> {
        self.items.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(n: usize) -> RoutingDecision {
        RoutingDecision {
            ts: format!("2026-02-10T09:00:0{}.000Z", n % 10),
            topic_id: format!("topic-{n}"),
            topic_name: format!("Topic {n}"),
            task_id: None,
            task_title: None,
            anchor: format!("anchor {n}"),
        }
    }

    #[test]
    fn push_caps_and_keeps_newest() {
        let mut memory = SessionRoutingMemory {
            session_key: "channel:general".into(),
            items: vec![],
            updated_at: "2026-02-10T09:00:00.000Z".into(),
        };
        for n in 0..12 {
            memory.push(decision(n), DEFAULT_MAX_ITEMS);
        }
        assert_eq!(memory.items.len(), DEFAULT_MAX_ITEMS);
        assert_eq!(memory.items[0].topic_id, "topic-4");
        assert_eq!(memory.latest().unwrap().topic_id, "topic-11");
    }
}
