//! Space: tenancy and visibility root.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Id of the seeded space that always exists.
pub const DEFAULT_SPACE_ID: &str = "space-default";
pub const DEFAULT_SPACE_NAME: &str = "Default";

/// A tenancy/visibility root.
///
/// `connectivity` holds explicit outbound visibility toggles keyed by other
/// space ids; visibility is computed from those edges only. `default_visible`
/// is a seed policy applied when a new space is first discovered, never a
/// live visibility rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub default_visible: bool,
    #[serde(default)]
    pub connectivity: BTreeMap<String, bool>,
    pub created_at: String,
    pub updated_at: String,
}

fn default_true() -> bool {
    true
}

impl Space {
    /// Normalize connectivity in place: drop empty keys and self edges.
    pub fn normalize_connectivity(&mut self) {
        let id = self.id.clone();
        self.connectivity
            .retain(|key, _| !key.trim().is_empty() && *key != id);
    }

    /// Space ids visible from this space: itself plus enabled outbound edges.
    pub fn allowed_space_ids(&self) -> Vec<String> {
        let mut out = vec![self.id.clone()];
        out.extend(
            self.connectivity
                .iter()
                .filter(|(_, enabled)| **enabled)
                .map(|(id, _)| id.clone()),
        );
        out
    }
}
