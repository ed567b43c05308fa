//! Topic: a durable workstream that logs are routed into.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DomainError;

/// Who created a topic or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedBy {
    User,
    Classifier,
    Import,
}

impl Default for CreatedBy {
    fn default() -> Self {
        CreatedBy::User
    }
}

impl std::fmt::Display for CreatedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreatedBy::User => write!(f, "user"),
            CreatedBy::Classifier => write!(f, "classifier"),
            CreatedBy::Import => write!(f, "import"),
        }
    }
}

impl std::str::FromStr for CreatedBy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(CreatedBy::User),
            "classifier" => Ok(CreatedBy::Classifier),
            "import" => Ok(CreatedBy::Import),
            other => Err(DomainError::UnknownVariant {
                kind: "createdBy",
                value: other.to_string(),
            }),
        }
    }
}

/// Priority shared by topics and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(DomainError::UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// Topic lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Active,
    Snoozed,
    Archived,
}

impl Default for TopicStatus {
    fn default() -> Self {
        TopicStatus::Active
    }
}

impl std::fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicStatus::Active => write!(f, "active"),
            TopicStatus::Snoozed => write!(f, "snoozed"),
            TopicStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for TopicStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TopicStatus::Active),
            "snoozed" => Ok(TopicStatus::Snoozed),
            "archived" => Ok(TopicStatus::Archived),
            other => Err(DomainError::UnknownVariant {
                kind: "topicStatus",
                value: other.to_string(),
            }),
        }
    }
}

/// A durable workstream.
///
/// Listing order is pinned-first, then `sort_index` ascending, then
/// `updated_at` descending; new rows take `min(sort_index) - 1` within their
/// pinned group so they surface at the top without reshuffling the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub space_id: String,
    pub name: String,
    #[serde(default)]
    pub created_by: CreatedBy,
    #[serde(default)]
    pub sort_index: i64,
    pub color: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: TopicStatus,
    pub snoozed_until: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    pub digest: Option<String>,
    pub digest_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Normalize a user-supplied color to `#RRGGBB`, uppercased.
pub fn normalize_hex_color(value: Option<&str>) -> Option<String> {
    let text = value?.trim();
    let rest = text.strip_prefix('#')?;
    if rest.len() == 6 && rest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(format!("#{}", rest.to_ascii_uppercase()));
    }
    None
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    (
        ((r1 + m) * 255.0).round() as u8,
        ((g1 + m) * 255.0).round() as u8,
        ((b1 + m) * 255.0).round() as u8,
    )
}

/// Deterministically pick a display color for a name.
///
/// Hashes the seed into a hue and walks the wheel in 29-degree steps until a
/// color not in `used` is found, so sibling rows with similar names still
/// come out visually distinct.
pub fn auto_pick_color(seed: &str, used: &BTreeSet<String>) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let base_hue = (u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % 360) as f64;
    let sat = (0.62 + (u16::from_be_bytes([digest[4], digest[5]]) % 13) as f64 / 100.0).min(0.80);
    let lig = (0.50 + (u16::from_be_bytes([digest[6], digest[7]]) % 11) as f64 / 100.0).min(0.66);

    let mut color = String::new();
    for step in 0..24 {
        let hue = (base_hue + step as f64 * 29.0) % 360.0;
        let (r, g, b) = hsl_to_rgb(hue, sat, lig);
        color = format!("#{r:02X}{g:02X}{b:02X}");
        if !used.contains(&color) {
            return color;
        }
    }
    color
}
