//! Graph assembly: nodes from topics/tasks/entities/agents, weighted edges
//! from co-occurrence and shared-entity relatedness.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use clawboard_types::{sanitize_log_text, LogEntry, LogType, Task, TaskStatus, Topic};

use crate::entities::{extract_entities, slug};

const TOPIC_COLOR: &str = "#ff8a4a";
const TASK_COLOR: &str = "#4ea1ff";
const ENTITY_COLOR: &str = "#45c4a0";
const AGENT_COLOR: &str = "#f2c84b";

const MAX_EDGES: usize = 1200;

#[derive(Debug, Clone, Copy)]
pub struct GraphOptions {
    pub max_entities: usize,
    pub max_nodes: usize,
    pub min_edge_weight: f64,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            max_entities: 120,
            max_nodes: 260,
            min_edge_weight: 0.16,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: f64,
    pub size: f64,
    pub color: String,
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub weight: f64,
    pub evidence: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub topic_count: usize,
    pub task_count: usize,
    pub entity_count: usize,
    pub agent_count: usize,
    pub density: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub generated_at: Option<String>,
    pub stats: GraphStats,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

struct NodeBuild {
    id: String,
    label: String,
    kind: &'static str,
    score: f64,
    meta: serde_json::Value,
}

fn node_size(kind: &str, score: f64) -> f64 {
    let base = match kind {
        "topic" => 20.0,
        "task" => 15.0,
        "agent" => 11.5,
        _ => 10.5,
    };
    let boost = (score.max(0.0).sqrt() * 2.4).clamp(0.0, 22.0);
    ((base + boost) * 100.0).round() / 100.0
}

fn node_color(kind: &str) -> &'static str {
    match kind {
        "topic" => TOPIC_COLOR,
        "task" => TASK_COLOR,
        "agent" => AGENT_COLOR,
        _ => ENTITY_COLOR,
    }
}

fn status_boost(status: TaskStatus) -> f64 {
    match status {
        TaskStatus::Doing => 0.9,
        TaskStatus::Blocked => 0.7,
        TaskStatus::Todo => 0.45,
        TaskStatus::Done => 0.1,
    }
}

fn log_base_weight(log_type: LogType) -> f64 {
    match log_type {
        LogType::Conversation => 1.0,
        LogType::Action => 0.72,
        LogType::System => 0.55,
        LogType::Import => 0.45,
        LogType::Note => 0.66,
    }
}

type EdgeKey = (String, String, &'static str);

fn edge_key(source: &str, target: &str, kind: &'static str, undirected: bool) -> EdgeKey {
    if undirected && source > target {
        (target.to_string(), source.to_string(), kind)
    } else {
        (source.to_string(), target.to_string(), kind)
    }
}

fn jaccard_words(a: &str, b: &str) -> f64 {
    let words = |value: &str| -> HashSet<String> {
        value
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(|w| w.to_string())
            .collect()
    };
    let wa = words(a);
    let wb = words(b);
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let inter = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

/// Build the entity graph from a recent window of rows. Pure: no store or
/// clock access; the caller stamps `generated_at`.
pub fn build_graph(
    topics: &[Topic],
    tasks: &[Task],
    logs: &[LogEntry],
    options: GraphOptions,
) -> Graph {
    let mut nodes: BTreeMap<String, NodeBuild> = BTreeMap::new();
    let mut edge_weights: BTreeMap<EdgeKey, f64> = BTreeMap::new();
    let mut edge_evidence: BTreeMap<EdgeKey, usize> = BTreeMap::new();

    // Curated notes boost the logs they annotate.
    let mut notes_by_related: HashMap<String, Vec<String>> = HashMap::new();
    for entry in logs {
        if entry.log_type != LogType::Note {
            continue;
        }
        let Some(related) = entry.related_log_id.as_deref().filter(|r| !r.is_empty()) else {
            continue;
        };
        let content = sanitize_log_text(if entry.content.is_empty() {
            entry.summary.as_deref().unwrap_or("")
        } else {
            &entry.content
        });
        if content.is_empty() {
            continue;
        }
        let bucket = notes_by_related.entry(related.to_string()).or_default();
        if bucket.len() < 4 {
            bucket.push(content.chars().take(800).collect());
        }
    }

    // Structural nodes first.
    for topic in topics {
        let node_id = format!("topic:{}", topic.id);
        nodes.insert(
            node_id.clone(),
            NodeBuild {
                id: node_id,
                label: topic.name.clone(),
                kind: "topic",
                score: 1.6 + if topic.pinned { 0.65 } else { 0.0 },
                meta: serde_json::json!({
                    "topicId": topic.id,
                    "description": topic.description,
                    "pinned": topic.pinned,
                }),
            },
        );
    }
    for task in tasks {
        let node_id = format!("task:{}", task.id);
        let boost = status_boost(task.status);
        nodes.insert(
            node_id.clone(),
            NodeBuild {
                id: node_id.clone(),
                label: task.title.clone(),
                kind: "task",
                score: 1.1 + boost + if task.pinned { 0.45 } else { 0.0 },
                meta: serde_json::json!({
                    "taskId": task.id,
                    "topicId": task.topic_id,
                    "status": task.status.to_string(),
                    "pinned": task.pinned,
                }),
            },
        );
        if let Some(topic_id) = &task.topic_id {
            let parent = format!("topic:{topic_id}");
            if nodes.contains_key(&parent) {
                let key = edge_key(&parent, &node_id, "has_task", false);
                *edge_weights.entry(key.clone()).or_default() += 1.0 + boost * 0.25;
                *edge_evidence.entry(key).or_default() += 1;
            }
        }
    }

    // Entity extraction over the non-note log window.
    let mut entity_score: HashMap<String, f64> = HashMap::new();
    let mut entity_label: HashMap<String, String> = HashMap::new();
    let mut topic_entities: HashMap<String, HashMap<String, f64>> = HashMap::new();
    let mut task_entities: HashMap<String, HashMap<String, f64>> = HashMap::new();
    let mut agent_entities: HashMap<String, HashMap<String, f64>> = HashMap::new();

    for entry in logs {
        if entry.log_type == LogType::Note {
            continue;
        }
        let attached_notes = notes_by_related
            .get(&entry.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let raw_head: String = entry
            .raw
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(900)
            .collect();
        let combined = [
            entry.summary.as_deref().unwrap_or(""),
            &entry.content,
            &raw_head,
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(attached_notes.iter().cloned())
        .collect::<Vec<_>>()
        .join("\n");
        let entities = extract_entities(&combined);
        if entities.is_empty() {
            continue;
        }

        let agent_label_text = entry
            .agent_label
            .clone()
            .or_else(|| entry.agent_id.clone())
            .unwrap_or_default()
            .trim()
            .to_string();
        if !agent_label_text.is_empty() {
            let agent_node = format!("agent:{}", slug(&agent_label_text));
            let node = nodes.entry(agent_node.clone()).or_insert_with(|| NodeBuild {
                id: agent_node.clone(),
                label: agent_label_text.chars().take(38).collect(),
                kind: "agent",
                score: 0.9,
                meta: serde_json::json!({ "agentLabel": agent_label_text }),
            });
            node.score += 0.1;
        }

        let note_boost = 1.0 + (attached_notes.len() as f64 * 0.2).min(0.8);
        let weight = log_base_weight(entry.log_type) * note_boost;

        let mut entity_ids: Vec<String> = Vec::new();
        for entity in entities {
            let key = entity.to_lowercase();
            *entity_score.entry(key.clone()).or_default() += weight;
            let label = entity_label.entry(key.clone()).or_default();
            // Prefer the longer surface form as the display label.
            if entity.len() > label.len() {
                *label = entity.clone();
            }
            let entity_id = format!("entity:{}", slug(&key));
            entity_ids.push(entity_id.clone());
            if let Some(topic_id) = &entry.topic_id {
                *topic_entities
                    .entry(topic_id.clone())
                    .or_default()
                    .entry(entity_id.clone())
                    .or_default() += weight;
            }
            if let Some(task_id) = &entry.task_id {
                *task_entities
                    .entry(task_id.clone())
                    .or_default()
                    .entry(entity_id.clone())
                    .or_default() += weight;
            }
            if !agent_label_text.is_empty() {
                *agent_entities
                    .entry(agent_label_text.clone())
                    .or_default()
                    .entry(entity_id)
                    .or_default() += weight * 0.85;
            }
        }

        // Entity co-occurrence within one log.
        entity_ids.sort();
        entity_ids.dedup();
        for i in 0..entity_ids.len() {
            for j in (i + 1)..entity_ids.len() {
                let key = edge_key(&entity_ids[i], &entity_ids[j], "co_occurs", true);
                *edge_weights.entry(key.clone()).or_default() += (weight * 0.38).max(0.12);
                *edge_evidence.entry(key).or_default() += 1;
            }
        }
    }

    // Keep the top entities as nodes.
    let mut ranked_entities: Vec<(&String, &f64)> = entity_score.iter().collect();
    ranked_entities.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
    let selected: Vec<String> = ranked_entities
        .iter()
        .take(options.max_entities.max(12))
        .map(|(key, _)| (*key).clone())
        .collect();
    let selected_ids: HashSet<String> = selected.iter().map(|k| format!("entity:{}", slug(k))).collect();
    for key in &selected {
        let node_id = format!("entity:{}", slug(key));
        let score = entity_score.get(key).copied().unwrap_or(0.0);
        nodes.insert(
            node_id.clone(),
            NodeBuild {
                id: node_id,
                label: entity_label.get(key).cloned().unwrap_or_else(|| key.clone()),
                kind: "entity",
                score: 0.9 + score,
                meta: serde_json::json!({
                    "entityKey": key,
                    "mentions": (score * 1000.0).round() / 1000.0,
                }),
            },
        );
    }

    // Mentions edges into the selected entities.
    let mut add_mentions = |prefix: &str,
                            map: &HashMap<String, HashMap<String, f64>>,
                            kind: &'static str,
                            node_boost: f64,
                            nodes: &mut BTreeMap<String, NodeBuild>| {
        for (owner_id, ent_map) in map {
            let source = format!("{prefix}:{}", if prefix == "agent" { slug(owner_id) } else { owner_id.clone() });
            if !nodes.contains_key(&source) {
                continue;
            }
            for (entity_id, weight) in ent_map {
                if !selected_ids.contains(entity_id) {
                    continue;
                }
                let key = edge_key(&source, entity_id, kind, false);
                *edge_weights.entry(key.clone()).or_default() += weight;
                *edge_evidence.entry(key).or_default() += 1;
                if node_boost > 0.0 {
                    if let Some(node) = nodes.get_mut(&source) {
                        node.score += weight * node_boost;
                    }
                }
            }
        }
    };
    add_mentions("topic", &topic_entities, "mentions", 0.05, &mut nodes);
    add_mentions("task", &task_entities, "mentions", 0.035, &mut nodes);
    add_mentions("agent", &agent_entities, "agent_focus", 0.0, &mut nodes);

    // Topic relatedness via shared entities plus name overlap.
    for i in 0..topics.len() {
        for j in (i + 1)..topics.len() {
            let left = &topics[i];
            let right = &topics[j];
            let left_map = topic_entities.get(&left.id);
            let right_map = topic_entities.get(&right.id);
            let mut shared = 0.0;
            if let (Some(lm), Some(rm)) = (left_map, right_map) {
                for (entity_id, lw) in lm {
                    if selected_ids.contains(entity_id) {
                        if let Some(rw) = rm.get(entity_id) {
                            shared += lw.min(*rw);
                        }
                    }
                }
            }
            let lexical = jaccard_words(&left.name, &right.name);
            let score = shared * 0.12 + lexical;
            if score < 0.28 {
                continue;
            }
            let key = edge_key(
                &format!("topic:{}", left.id),
                &format!("topic:{}", right.id),
                "related_topic",
                true,
            );
            *edge_weights.entry(key.clone()).or_default() += score;
            *edge_evidence.entry(key).or_default() += 1;
        }
    }

    // Task relatedness inside the same topic.
    let mut tasks_by_topic: HashMap<&str, Vec<&Task>> = HashMap::new();
    for task in tasks {
        if let Some(topic_id) = task.topic_id.as_deref() {
            tasks_by_topic.entry(topic_id).or_default().push(task);
        }
    }
    for siblings in tasks_by_topic.values() {
        for i in 0..siblings.len() {
            for j in (i + 1)..siblings.len() {
                let left_map = task_entities.get(&siblings[i].id);
                let right_map = task_entities.get(&siblings[j].id);
                let mut shared = 0.0;
                if let (Some(lm), Some(rm)) = (left_map, right_map) {
                    for (entity_id, lw) in lm {
                        if selected_ids.contains(entity_id) {
                            if let Some(rw) = rm.get(entity_id) {
                                shared += lw.min(*rw);
                            }
                        }
                    }
                }
                if shared < 0.95 {
                    continue;
                }
                let key = edge_key(
                    &format!("task:{}", siblings[i].id),
                    &format!("task:{}", siblings[j].id),
                    "related_task",
                    true,
                );
                *edge_weights.entry(key.clone()).or_default() += shared * 0.11;
                *edge_evidence.entry(key).or_default() += 1;
            }
        }
    }

    // Node budget: structural nodes always survive; entities by score.
    let structural: HashSet<String> = nodes
        .values()
        .filter(|n| n.kind != "entity")
        .map(|n| n.id.clone())
        .collect();
    let mut entity_nodes: Vec<(&String, f64)> = nodes
        .values()
        .filter(|n| n.kind == "entity")
        .map(|n| (&n.id, n.score))
        .collect();
    entity_nodes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let keep_entities = options
        .max_entities
        .min(options.max_nodes.saturating_sub(structural.len()))
        .max(10);
    let mut kept: HashSet<String> = structural.clone();
    kept.extend(entity_nodes.iter().take(keep_entities).map(|(id, _)| (*id).clone()));

    // Edges: drop anything referencing a dropped node, apply the weight
    // threshold (structure edges are exempt), cap the total.
    let mut edge_rows: Vec<(EdgeKey, f64)> = edge_weights.into_iter().collect();
    edge_rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut edges: Vec<GraphEdge> = Vec::new();
    for ((source, target, kind), weight) in edge_rows {
        if !kept.contains(&source) || !kept.contains(&target) {
            continue;
        }
        if weight < options.min_edge_weight && kind != "has_task" {
            continue;
        }
        edges.push(GraphEdge {
            id: String::new(),
            source: source.clone(),
            target: target.clone(),
            kind: kind.to_string(),
            weight: (weight * 10_000.0).round() / 10_000.0,
            evidence: edge_evidence
                .get(&(source, target, kind))
                .copied()
                .unwrap_or(1),
        });
        if edges.len() >= MAX_EDGES {
            break;
        }
    }

    // Only emit nodes that participate, plus all structural rows.
    let mut used: HashSet<String> = structural;
    for edge in &edges {
        used.insert(edge.source.clone());
        used.insert(edge.target.clone());
    }

    let mut node_rows: Vec<GraphNode> = nodes
        .values()
        .filter(|n| used.contains(&n.id) && kept.contains(&n.id))
        .map(|n| GraphNode {
            id: n.id.clone(),
            label: n.label.clone(),
            kind: n.kind.to_string(),
            score: (n.score * 10_000.0).round() / 10_000.0,
            size: node_size(n.kind, n.score),
            color: node_color(n.kind).to_string(),
            meta: n.meta.clone(),
        })
        .collect();
    node_rows.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.label.cmp(&b.label))
    });

    // Deterministic edge ids assigned after filtering.
    for (index, edge) in edges.iter_mut().enumerate() {
        edge.id = format!("edge-{}", index + 1);
    }

    let count_kind = |kind: &str| node_rows.iter().filter(|n| n.kind == kind).count();
    let node_count = node_rows.len();
    let density_base = (node_count.saturating_sub(1) * node_count) as f64 / 2.0;
    let density = if density_base > 0.0 {
        (edges.len() as f64 / density_base).min(1.0)
    } else {
        0.0
    };

    Graph {
        generated_at: None,
        stats: GraphStats {
            node_count,
            edge_count: edges.len(),
            topic_count: count_kind("topic"),
            task_count: count_kind("task"),
            entity_count: count_kind("entity"),
            agent_count: count_kind("agent"),
            density: (density * 10_000.0).round() / 10_000.0,
        },
        nodes: node_rows,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawboard_types::{ClassificationStatus, CreatedBy, TopicStatus};

    fn topic(id: &str, name: &str) -> Topic {
        Topic {
            id: id.into(),
            space_id: "space-default".into(),
            name: name.into(),
            created_by: CreatedBy::User,
            sort_index: 0,
            color: None,
            description: None,
            priority: None,
            status: TopicStatus::Active,
            snoozed_until: None,
            tags: vec![],
            parent_id: None,
            pinned: false,
            digest: None,
            digest_updated_at: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    fn task(id: &str, topic_id: &str, title: &str, status: TaskStatus) -> Task {
        Task {
            id: id.into(),
            space_id: "space-default".into(),
            topic_id: Some(topic_id.into()),
            title: title.into(),
            created_by: CreatedBy::User,
            sort_index: 0,
            color: None,
            status,
            priority: None,
            due_date: None,
            snoozed_until: None,
            tags: vec![],
            pinned: false,
            digest: None,
            digest_updated_at: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    fn log(id: &str, topic_id: Option<&str>, content: &str) -> LogEntry {
        LogEntry {
            id: id.into(),
            space_id: "space-default".into(),
            topic_id: topic_id.map(|t| t.into()),
            task_id: None,
            related_log_id: None,
            idempotency_key: None,
            log_type: LogType::Conversation,
            content: content.into(),
            summary: None,
            raw: None,
            classification_status: ClassificationStatus::Classified,
            classification_attempts: 1,
            classification_error: None,
            created_at: "2026-01-02T00:00:00.000Z".into(),
            updated_at: "2026-01-02T00:00:00.000Z".into(),
            agent_id: Some("assistant".into()),
            agent_label: Some("Claw".into()),
            source: None,
            attachments: None,
        }
    }

    #[test]
    fn has_task_edges_link_topics_to_tasks() {
        let topics = vec![topic("t1", "Billing")];
        let tasks = vec![task("k1", "t1", "Fix invoices", TaskStatus::Doing)];
        let graph = build_graph(&topics, &tasks, &[], GraphOptions::default());
        assert_eq!(graph.stats.topic_count, 1);
        assert_eq!(graph.stats.task_count, 1);
        let edge = graph.edges.iter().find(|e| e.kind == "has_task").unwrap();
        assert_eq!(edge.source, "topic:t1");
        assert_eq!(edge.target, "task:k1");
        assert_eq!(edge.id, "edge-1");
    }

    #[test]
    fn mentions_and_co_occurrence_edges_appear() {
        let topics = vec![topic("t1", "Infra")];
        let logs = vec![
            log("l1", Some("t1"), "Deploy NIMBUS through OpenClaw tonight"),
            log("l2", Some("t1"), "NIMBUS and OpenClaw are both flaky"),
        ];
        let graph = build_graph(&topics, &[], &logs, GraphOptions::default());
        assert!(graph.edges.iter().any(|e| e.kind == "mentions"));
        assert!(graph.edges.iter().any(|e| e.kind == "co_occurs"));
        assert!(graph.nodes.iter().any(|n| n.kind == "entity" && n.label == "NIMBUS"));
        assert!(graph.nodes.iter().any(|n| n.kind == "agent"));
    }

    #[test]
    fn edge_ids_are_deterministic_after_filtering() {
        let topics = vec![topic("t1", "Infra")];
        let logs = vec![log("l1", Some("t1"), "NIMBUS deploy via OpenClaw")];
        let graph = build_graph(&topics, &[], &logs, GraphOptions::default());
        for (index, edge) in graph.edges.iter().enumerate() {
            assert_eq!(edge.id, format!("edge-{}", index + 1));
        }
    }

    #[test]
    fn min_edge_weight_does_not_drop_structure() {
        let topics = vec![topic("t1", "Billing")];
        let tasks = vec![task("k1", "t1", "Fix invoices", TaskStatus::Done)];
        let graph = build_graph(
            &topics,
            &tasks,
            &[],
            GraphOptions {
                min_edge_weight: 5.0,
                ..GraphOptions::default()
            },
        );
        assert!(graph.edges.iter().any(|e| e.kind == "has_task"));
    }

    #[test]
    fn node_budget_keeps_structural_nodes() {
        let topics: Vec<Topic> = (0..5).map(|n| topic(&format!("t{n}"), &format!("Topic {n}"))).collect();
        let logs: Vec<LogEntry> = (0..40)
            .map(|n| {
                log(
                    &format!("l{n}"),
                    Some("t0"),
                    &format!("EntityAlpha{n} EntityBeta{n} SharedCore discussion"),
                )
            })
            .collect();
        let graph = build_graph(
            &topics,
            &[],
            &logs,
            GraphOptions {
                max_entities: 12,
                max_nodes: 20,
                ..GraphOptions::default()
            },
        );
        assert_eq!(graph.stats.topic_count, 5);
        assert!(graph.stats.entity_count <= 12);
    }

    #[test]
    fn notes_boost_their_log_weight() {
        let topics = vec![topic("t1", "Infra")];
        let mut note = log("n1", None, "root cause was NIMBUS quota");
        note.log_type = LogType::Note;
        note.related_log_id = Some("l1".into());
        let logs = vec![log("l1", Some("t1"), "NIMBUS deploy failed"), note];
        let boosted = build_graph(&topics, &[], &logs, GraphOptions::default());
        let plain = build_graph(
            &topics,
            &[],
            &[log("l1", Some("t1"), "NIMBUS deploy failed")],
            GraphOptions::default(),
        );
        let weight_of = |g: &Graph| {
            g.edges
                .iter()
                .find(|e| e.kind == "mentions" && e.target.contains("nimbus"))
                .map(|e| e.weight)
                .unwrap_or(0.0)
        };
        assert!(weight_of(&boosted) > weight_of(&plain));
    }
}
