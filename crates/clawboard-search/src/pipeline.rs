//! The hybrid search pipeline.
//!
//! Per namespace (topics, tasks, logs): normalize and tokenize the query,
//! score candidates lexically (Jaccard) and with BM25 over the candidate
//! window, merge vector top-k, fuse with RRF, optionally rerank, then apply
//! parent/child propagation, note weighting, session continuity boosts, and
//! space scoping before capping to the requested limits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use clawboard_embeddings::EmbeddingProvider;
use clawboard_types::{clip, log_index_text, LogEntry, LogType, Task, Topic};
use clawboard_vector::{KindSelector, VectorIndex};

use crate::bm25::{best_chunk, BestChunk, Bm25Window};
use crate::gate::AdmissionGate;
use crate::rerank::{blend, Reranker};
use crate::rrf::fuse;
use crate::text::{lexical_similarity, normalize, session_matches, token_set};

/// Per-namespace result caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchLimits {
    pub topics: usize,
    pub tasks: usize,
    pub logs: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            topics: 24,
            tasks: 48,
            logs: 360,
        }
    }
}

impl SearchLimits {
    /// Reduced caps used by the busy fallback pass.
    pub fn degraded(self) -> Self {
        Self {
            topics: self.topics.min(8),
            tasks: self.tasks.min(12),
            logs: self.logs.min(60),
        }
    }
}

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub session_key: Option<String>,
    pub allowed_space_ids: Option<Vec<String>>,
    pub limits: SearchLimits,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            session_key: None,
            allowed_space_ids: None,
            limits: SearchLimits::default(),
        }
    }
}

/// Explain fields attached to every hit.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explain {
    pub vector_score: f32,
    pub bm25_score: f32,
    pub lexical_score: f32,
    pub rrf_score: f32,
    pub rerank_score: f32,
    pub note_weight: f32,
    pub session_boosted: bool,
    pub direct_match_boost: f32,
    pub log_propagation_weight: f32,
    pub task_propagation_weight: f32,
    pub note_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_chunk: Option<BestChunk>,
}

/// A scored candidate in one namespace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    pub id: String,
    pub score: f32,
    #[serde(flatten)]
    pub explain: Explain,
}

/// Diagnostics for the response meta block.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMeta {
    pub duration_ms: u64,
    pub gate_wait_ms: u64,
    pub effective_limits: SearchLimits,
    pub query_token_count: usize,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub query: String,
    pub mode: String,
    pub topics: Vec<Hit>,
    pub tasks: Vec<Hit>,
    pub logs: Vec<Hit>,
    pub meta: SearchMeta,
}

const TOPIC_MIN_SCORE: f32 = 0.08;
const TASK_MIN_SCORE: f32 = 0.08;
const LOG_MIN_SCORE: f32 = 0.06;

/// The search engine: vector index + embedder + optional reranker behind a
/// single-flight admission gate.
pub struct SearchEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    gate: AdmissionGate,
    /// Reranker blend weight (environment-tunable).
    rerank_alpha: f32,
}

impl SearchEngine {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            reranker: None,
            gate: AdmissionGate::default(),
            rerank_alpha: 0.5,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>, alpha: f32) -> Self {
        self.reranker = Some(reranker);
        self.rerank_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Run one hybrid search over the given candidate rows.
    pub async fn search(
        &self,
        topics: &[Topic],
        tasks: &[Task],
        logs: &[LogEntry],
        request: &SearchRequest,
    ) -> SearchOutcome {
        let started = Instant::now();
        let query = normalize(&request.query);
        let query_tokens = token_set(&query);

        if query.chars().count() < 2 {
            return SearchOutcome {
                query,
                mode: "empty".into(),
                topics: Vec::new(),
                tasks: Vec::new(),
                logs: Vec::new(),
                meta: SearchMeta {
                    duration_ms: started.elapsed().as_millis() as u64,
                    gate_wait_ms: 0,
                    effective_limits: request.limits,
                    query_token_count: 0,
                    degraded: false,
                },
            };
        }

        let admission = self.gate.admit().await;
        let degraded = admission.degraded();
        let limits = if degraded {
            request.limits.degraded()
        } else {
            request.limits
        };

        // Space scoping drops candidates before any scoring work.
        let topics: Vec<&Topic> = topics
            .iter()
            .filter(|t| space_allowed(&request.allowed_space_ids, &t.space_id))
            .collect();
        let tasks: Vec<&Task> = tasks
            .iter()
            .filter(|t| space_allowed(&request.allowed_space_ids, &t.space_id))
            .collect();
        let logs: Vec<&LogEntry> = logs
            .iter()
            .filter(|l| space_allowed(&request.allowed_space_ids, &l.space_id))
            .collect();

        let query_vector = match self.embedder.embed(&query).await {
            Ok(vector) if !vector.is_empty() => Some(vector),
            Ok(_) => None,
            Err(err) => {
                // Search downgrades to lexical-only and continues.
                warn!(error = %err, "query embedding unavailable, lexical mode");
                None
            }
        };
        let base_mode = if query_vector.is_some() {
            "vector+lexical"
        } else {
            "lexical"
        };

        let topic_vec = self
            .vector_scores(
                &query_vector,
                KindSelector::Exact("topic".into()),
                limits.topics * 4,
            )
            .await;
        let task_vec = self
            .vector_scores(
                &query_vector,
                KindSelector::Prefix("task:".into()),
                limits.tasks * 4,
            )
            .await;
        let log_vec = self
            .vector_scores(&query_vector, KindSelector::Exact("log".into()), limits.logs * 2)
            .await;

        // Note maps drive both the note-weighting bonus and response notes.
        let mut note_counts: HashMap<String, usize> = HashMap::new();
        for entry in &logs {
            if entry.log_type == LogType::Note {
                if let Some(related) = entry.related_log_id.as_deref() {
                    *note_counts.entry(related.to_string()).or_default() += 1;
                }
            }
        }

        // Session membership for continuity boosts.
        let mut session_log_ids: HashSet<String> = HashSet::new();
        let mut session_topic_ids: HashSet<String> = HashSet::new();
        let mut session_task_ids: HashSet<String> = HashSet::new();
        if let Some(caller_key) = request.session_key.as_deref() {
            for entry in &logs {
                let Some(entry_key) = entry.session_key() else {
                    continue;
                };
                if !session_matches(entry_key, caller_key) {
                    continue;
                }
                session_log_ids.insert(entry.id.clone());
                if let Some(topic_id) = &entry.topic_id {
                    session_topic_ids.insert(topic_id.clone());
                }
                if let Some(task_id) = &entry.task_id {
                    session_task_ids.insert(task_id.clone());
                }
            }
        }

        // Per-namespace candidate texts.
        let topic_texts: Vec<(String, String)> = topics
            .iter()
            .map(|t| {
                let text = match &t.description {
                    Some(d) => format!("{} {}", t.name, d),
                    None => t.name.clone(),
                };
                (t.id.clone(), normalize(&text))
            })
            .collect();
        let task_texts: Vec<(String, String)> = tasks
            .iter()
            .map(|t| (t.id.clone(), normalize(&format!("{} {}", t.title, t.status))))
            .collect();
        let log_texts: Vec<(String, String)> = logs
            .iter()
            .filter(|l| l.log_type != LogType::Note)
            .map(|l| {
                let text = log_index_text(l)
                    .unwrap_or_else(|| clip(&normalize(l.summary.as_deref().unwrap_or("")), 1200));
                (l.id.clone(), text)
            })
            .collect();

        let mut topic_hits = self
            .score_namespace(&query, &topic_texts, &topic_vec, TOPIC_MIN_SCORE)
            .await;
        let mut task_hits = self
            .score_namespace(&query, &task_texts, &task_vec, TASK_MIN_SCORE)
            .await;
        let mut log_hits = self
            .score_namespace(&query, &log_texts, &log_vec, LOG_MIN_SCORE)
            .await;

        // Note weighting on logs, then propagation up to parents.
        let log_index: HashMap<&str, &LogEntry> = logs.iter().map(|l| (l.id.as_str(), *l)).collect();
        let mut topic_note_weight: HashMap<String, f32> = HashMap::new();
        let mut task_note_weight: HashMap<String, f32> = HashMap::new();
        for (related_id, count) in &note_counts {
            if let Some(entry) = log_index.get(related_id.as_str()) {
                let weight = (0.07 * *count as f32).min(0.24);
                if let Some(topic_id) = &entry.topic_id {
                    *topic_note_weight.entry(topic_id.clone()).or_default() += weight;
                }
                if let Some(task_id) = &entry.task_id {
                    *task_note_weight.entry(task_id.clone()).or_default() += weight;
                }
            }
        }

        for hit in log_hits.values_mut() {
            let count = note_counts.get(&hit.id).copied().unwrap_or(0);
            if count > 0 {
                let bonus = (0.06 * count as f32).min(0.24);
                hit.explain.note_weight = bonus;
                hit.explain.note_count = count;
                hit.score += bonus;
            }
            if session_log_ids.contains(&hit.id) {
                hit.explain.session_boosted = true;
                hit.score += 0.08;
            }
        }

        // Parent propagation from matched logs.
        let log_scores: Vec<(String, f32)> =
            log_hits.values().map(|h| (h.id.clone(), h.score)).collect();
        for (log_id, score) in &log_scores {
            let Some(entry) = log_index.get(log_id.as_str()) else {
                continue;
            };
            if let Some(topic_id) = &entry.topic_id {
                let weight = (score * 0.22).min(0.18);
                let hit = topic_hits.entry(topic_id.clone()).or_insert_with(|| Hit {
                    id: topic_id.clone(),
                    score: 0.0,
                    explain: Explain::default(),
                });
                hit.score += weight;
                hit.explain.log_propagation_weight += weight;
            }
            if let Some(task_id) = &entry.task_id {
                let weight = (score * 0.25).min(0.20);
                let hit = task_hits.entry(task_id.clone()).or_insert_with(|| Hit {
                    id: task_id.clone(),
                    score: 0.0,
                    explain: Explain::default(),
                });
                hit.score += weight;
                hit.explain.task_propagation_weight += weight;
            }
        }

        // Task-to-topic propagation requires sparse signal: multi-token
        // queries must land an explicit BM25 or lexical hit on the task,
        // otherwise broad vector drift would pull in whole topics.
        let task_parent: HashMap<&str, &str> = tasks
            .iter()
            .filter_map(|t| t.topic_id.as_deref().map(|topic| (t.id.as_str(), topic)))
            .collect();
        let task_snapshot: Vec<(String, f32, f32, f32)> = task_hits
            .values()
            .map(|h| (h.id.clone(), h.score, h.explain.bm25_score, h.explain.lexical_score))
            .collect();
        for (task_id, score, bm25, lexical) in task_snapshot {
            if query_tokens.len() > 1 && bm25 <= 0.0 && lexical <= 0.0 {
                continue;
            }
            let Some(topic_id) = task_parent.get(task_id.as_str()) else {
                continue;
            };
            let weight = (score * 0.18).min(0.12);
            if weight <= 0.0 {
                continue;
            }
            let hit = topic_hits.entry(topic_id.to_string()).or_insert_with(|| Hit {
                id: topic_id.to_string(),
                score: 0.0,
                explain: Explain::default(),
            });
            hit.score += weight;
            hit.explain.task_propagation_weight += weight;
        }

        // Note weight and session boost on parents.
        for hit in topic_hits.values_mut() {
            let weight = topic_note_weight.get(&hit.id).copied().unwrap_or(0.0).min(0.26);
            if weight > 0.0 {
                hit.explain.note_weight = weight;
                hit.score += weight;
            }
            if session_topic_ids.contains(&hit.id) {
                hit.explain.session_boosted = true;
                hit.score += 0.12;
            }
        }
        for hit in task_hits.values_mut() {
            let weight = task_note_weight.get(&hit.id).copied().unwrap_or(0.0).min(0.26);
            if weight > 0.0 {
                hit.explain.note_weight = weight;
                hit.score += weight;
            }
            if session_task_ids.contains(&hit.id) {
                hit.explain.session_boosted = true;
                hit.score += 0.10;
            }
        }

        let topic_rows = finalize(topic_hits, limits.topics, None);
        let task_rows = finalize(task_hits, limits.tasks, None);
        let created: HashMap<String, String> = logs
            .iter()
            .map(|l| (l.id.clone(), l.created_at.clone()))
            .collect();
        let log_rows = finalize(log_hits, limits.logs, Some(&created));

        let mode = if degraded {
            format!("{base_mode}+busy-fallback")
        } else {
            base_mode.to_string()
        };
        debug!(
            topics = topic_rows.len(),
            tasks = task_rows.len(),
            logs = log_rows.len(),
            %mode,
            "search complete"
        );

        SearchOutcome {
            query,
            mode,
            topics: topic_rows,
            tasks: task_rows,
            logs: log_rows,
            meta: SearchMeta {
                duration_ms: started.elapsed().as_millis() as u64,
                gate_wait_ms: admission.wait.as_millis() as u64,
                effective_limits: limits,
                query_token_count: query_tokens.len(),
                degraded,
            },
        }
    }

    async fn vector_scores(
        &self,
        query_vector: &Option<Vec<f32>>,
        selector: KindSelector,
        limit: usize,
    ) -> HashMap<String, f32> {
        let Some(vector) = query_vector else {
            return HashMap::new();
        };
        match self.index.topk(&selector, vector, limit.max(40)).await {
            Ok(points) => points.into_iter().map(|p| (p.id, p.score)).collect(),
            Err(err) => {
                warn!(error = %err, "vector topk failed, continuing lexically");
                HashMap::new()
            }
        }
    }

    /// Score one namespace: lexical + BM25 + vector, RRF fusion, optional
    /// rerank on the fused head.
    async fn score_namespace(
        &self,
        query: &str,
        candidates: &[(String, String)],
        vector_scores: &HashMap<String, f32>,
        min_score: f32,
    ) -> HashMap<String, Hit> {
        let window = Bm25Window::build(candidates.iter().map(|(id, text)| (id.as_str(), text.as_str())));
        let bm25_scores = window.score(query);

        let mut lexical_scores: HashMap<String, f32> = HashMap::new();
        for (id, text) in candidates {
            let lex = lexical_similarity(query, text);
            if lex > 0.0 {
                lexical_scores.insert(id.clone(), lex);
            }
        }

        let rrf_scores = fuse(&[
            vector_scores.iter().map(|(id, s)| (id.clone(), *s)).collect(),
            bm25_scores.iter().map(|(id, s)| (id.clone(), *s)).collect(),
            lexical_scores.iter().map(|(id, s)| (id.clone(), *s)).collect(),
        ]);

        // Optional rerank over the fused head (2x a generous limit).
        let mut rerank_scores: HashMap<String, f32> = HashMap::new();
        if let Some(reranker) = &self.reranker {
            let mut fused: Vec<(&String, &f32)> = rrf_scores.iter().collect();
            fused.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
            let text_by_id: HashMap<&str, &str> = candidates
                .iter()
                .map(|(id, text)| (id.as_str(), text.as_str()))
                .collect();
            let head: Vec<(String, String)> = fused
                .iter()
                .take(2 * candidates.len().min(64))
                .filter_map(|(id, _)| {
                    text_by_id
                        .get(id.as_str())
                        .map(|text| ((*id).clone(), (*text).to_string()))
                })
                .collect();
            if !head.is_empty() {
                match reranker.rerank(query, &head).await {
                    Ok(scores) => rerank_scores = scores,
                    Err(err) => warn!(error = %err, "rerank failed, using fused order"),
                }
            }
        }

        let query_text = query.to_string();
        let mut hits = HashMap::new();
        for (id, text) in candidates {
            let vector = vector_scores.get(id).copied().unwrap_or(0.0);
            let lexical = lexical_scores.get(id).copied().unwrap_or(0.0);
            let bm25 = bm25_scores.get(id).copied().unwrap_or(0.0);
            let rrf = rrf_scores.get(id).copied().unwrap_or(0.0);
            let rerank = rerank_scores.get(id).copied();

            let blended = blend(vector, lexical, rerank, self.rerank_alpha);
            let direct = direct_match_boost(&query_text, text);
            let score = blended.max(lexical * 0.68).max(rrf * 0.60) + direct;
            if score < min_score {
                continue;
            }
            hits.insert(
                id.clone(),
                Hit {
                    id: id.clone(),
                    score,
                    explain: Explain {
                        vector_score: vector,
                        bm25_score: bm25,
                        lexical_score: lexical,
                        rrf_score: rrf,
                        rerank_score: rerank.unwrap_or(0.0),
                        direct_match_boost: direct,
                        best_chunk: best_chunk(&query_text, text),
                        ..Explain::default()
                    },
                },
            );
        }
        hits
    }
}

fn space_allowed(allowed: &Option<Vec<String>>, space_id: &str) -> bool {
    match allowed {
        Some(ids) => ids.iter().any(|id| id == space_id),
        None => true,
    }
}

/// Exact or containing name matches get a small deterministic lift so the
/// obvious answer cannot be outranked by fuzzier candidates.
fn direct_match_boost(query: &str, text: &str) -> f32 {
    let q = query.to_lowercase();
    let t = text.to_lowercase();
    if q.len() < 3 {
        return 0.0;
    }
    if t == q {
        0.2
    } else if t.contains(&q) {
        0.1
    } else {
        0.0
    }
}

fn finalize(
    hits: HashMap<String, Hit>,
    limit: usize,
    created_at: Option<&HashMap<String, String>>,
) -> Vec<Hit> {
    let mut rows: Vec<Hit> = hits.into_values().collect();
    rows.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| match created_at {
                Some(map) => map
                    .get(&b.id)
                    .cmp(&map.get(&a.id))
                    .then_with(|| a.id.cmp(&b.id)),
                None => a.id.cmp(&b.id),
            })
    });
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawboard_embeddings::HashingEmbedder;
    use clawboard_types::{
        ClassificationStatus, CreatedBy, LogSource, TaskStatus, TopicStatus,
    };
    use clawboard_vector::LocalVectorIndex;

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

    fn task(id: &str, topic_id: &str, title: &str) -> Task {
        Task {
            id: id.into(),
            space_id: "space-default".into(),
            topic_id: Some(topic_id.into()),
            title: title.into(),
            created_by: CreatedBy::User,
            sort_index: 0,
            color: None,
            status: TaskStatus::Doing,
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

    fn log(id: &str, content: &str) -> LogEntry {
        LogEntry {
            id: id.into(),
            space_id: "space-default".into(),
            topic_id: None,
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
            agent_id: None,
            agent_label: None,
            source: None,
            attachments: None,
        }
    }

    async fn engine_with_index() -> SearchEngine {
        let index = Arc::new(LocalVectorIndex::open_in_memory().unwrap());
        let embedder = Arc::new(HashingEmbedder::new(64));
        // Seed vectors so vector scoring participates.
        for (kind, id, text) in [
            ("topic", "topic-billing", "billing invoices"),
            ("topic", "topic-frontend", "frontend design"),
            ("log", "log-1", "invoice export fails with http 500"),
        ] {
            let vector = embedder.embed(text).await.unwrap();
            index.upsert(kind, id, &vector).await.unwrap();
        }
        SearchEngine::new(index, embedder)
    }

    #[tokio::test]
    async fn short_query_returns_empty_mode() {
        let engine = engine_with_index().await;
        let outcome = engine
            .search(
                &[],
                &[],
                &[],
                &SearchRequest {
                    query: "x".into(),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(outcome.mode, "empty");
        assert!(outcome.topics.is_empty());
    }

    #[tokio::test]
    async fn lexical_match_surfaces_topic() {
        let engine = engine_with_index().await;
        let topics = vec![topic("topic-billing", "Billing"), topic("topic-frontend", "Frontend")];
        let outcome = engine
            .search(
                &topics,
                &[],
                &[],
                &SearchRequest {
                    query: "billing invoices".into(),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(outcome.mode, "vector+lexical");
        assert!(!outcome.topics.is_empty());
        assert_eq!(outcome.topics[0].id, "topic-billing");
        assert!(outcome.topics[0].explain.lexical_score > 0.0);
    }

    #[tokio::test]
    async fn log_match_propagates_to_parent_topic() {
        let engine = engine_with_index().await;
        let topics = vec![topic("topic-billing", "Completely Unrelated Name")];
        let mut entry = log("log-1", "invoice export fails with http 500");
        entry.topic_id = Some("topic-billing".into());
        let outcome = engine
            .search(
                &topics,
                &[],
                &[entry],
                &SearchRequest {
                    query: "invoice export 500".into(),
                    ..Default::default()
                },
            )
            .await;
        let log_hit = outcome.logs.iter().find(|h| h.id == "log-1").unwrap();
        let topic_hit = outcome.topics.iter().find(|h| h.id == "topic-billing").unwrap();
        assert!(topic_hit.explain.log_propagation_weight > 0.0);
        let expected = (log_hit.score * 0.22).min(0.18);
        assert!(topic_hit.score >= expected - 1e-6);
    }

    #[tokio::test]
    async fn notes_lift_their_log() {
        let engine = engine_with_index().await;
        let base = log("log-1", "invoice export fails with http 500");
        let mut note = log("note-1", "root cause: missing s3 permission");
        note.log_type = LogType::Note;
        note.related_log_id = Some("log-1".into());
        let plain = log("log-2", "invoice export fails with http 500");

        let outcome = engine
            .search(
                &[],
                &[],
                &[base, note, plain],
                &SearchRequest {
                    query: "invoice export".into(),
                    ..Default::default()
                },
            )
            .await;
        let noted = outcome.logs.iter().find(|h| h.id == "log-1").unwrap();
        let bare = outcome.logs.iter().find(|h| h.id == "log-2").unwrap();
        assert!(noted.score > bare.score);
        assert_eq!(noted.explain.note_count, 1);
        assert!((noted.explain.note_weight - 0.06).abs() < 1e-6);
    }

    #[tokio::test]
    async fn session_continuity_boosts_matching_rows() {
        let engine = engine_with_index().await;
        let mut in_session = log("log-1", "invoice export fails with http 500");
        in_session.source = Some(LogSource {
            session_key: Some("channel:general".into()),
            ..Default::default()
        });
        let out_of_session = log("log-2", "invoice export fails with http 500");

        let outcome = engine
            .search(
                &[],
                &[],
                &[in_session, out_of_session],
                &SearchRequest {
                    query: "invoice export".into(),
                    session_key: Some("channel:general".into()),
                    ..Default::default()
                },
            )
            .await;
        let boosted = outcome.logs.iter().find(|h| h.id == "log-1").unwrap();
        let plain = outcome.logs.iter().find(|h| h.id == "log-2").unwrap();
        assert!(boosted.explain.session_boosted);
        assert!(!plain.explain.session_boosted);
        assert!(boosted.score > plain.score);
    }

    #[tokio::test]
    async fn space_scope_drops_foreign_candidates() {
        let engine = engine_with_index().await;
        let mut foreign = topic("topic-billing", "Billing");
        foreign.space_id = "space-other".into();
        let outcome = engine
            .search(
                &[foreign],
                &[],
                &[],
                &SearchRequest {
                    query: "billing invoices".into(),
                    allowed_space_ids: Some(vec!["space-default".into()]),
                    ..Default::default()
                },
            )
            .await;
        assert!(outcome.topics.is_empty());
    }

    #[tokio::test]
    async fn multi_token_query_needs_lexical_hit_for_task_propagation() {
        let engine = engine_with_index().await;
        let topics = vec![topic("topic-billing", "Billing")];
        let tasks = vec![task("task-1", "topic-billing", "rotate api keys")];
        // "invoice export" shares no tokens with the task title, so even a
        // vector-ish score must not drag the topic in via the task.
        let outcome = engine
            .search(
                &topics,
                &tasks,
                &[],
                &SearchRequest {
                    query: "invoice export".into(),
                    ..Default::default()
                },
            )
            .await;
        if let Some(topic_hit) = outcome.topics.iter().find(|h| h.id == "topic-billing") {
            assert_eq!(topic_hit.explain.task_propagation_weight, 0.0);
        }
    }

    #[tokio::test]
    async fn busy_gate_degrades_limits_and_mode() {
        let engine = engine_with_index().await;
        let _held = engine.gate.admit().await;
        let topics = vec![topic("topic-billing", "Billing")];
        let outcome = engine
            .search(
                &topics,
                &[],
                &[],
                &SearchRequest {
                    query: "billing invoices".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(outcome.meta.degraded);
        assert!(outcome.mode.ends_with("+busy-fallback"));
        assert_eq!(outcome.meta.effective_limits.topics, 8);
    }
}
