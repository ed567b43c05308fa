//! The classifier cycle: lease the lock, page pending conversations, group
//! by session, resolve each session's oldest bundle, and patch routing back
//! through the ingest service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use clawboard_ingest::{IngestService, TaskUpsert, TopicUpsert};
use clawboard_search::{SearchEngine, SearchLimits, SearchRequest};
use clawboard_store::{logs, routing, tasks, topics, LogQuery, Store};
use clawboard_types::{
    clip, now_iso, sanitize_log_text, ClassificationStatus, CreatedBy, LogAppend, LogEntry,
    LogPatch, LogType, RoutingDecision,
};

use crate::bundle::{bundle_range, is_user_turn};
use crate::error::ClassifierError;
use crate::gate::{CreationGate, GateAudit, GateKind};
use crate::heuristics::{
    derive_task_title, derive_topic_name, is_low_signal, window_is_small_talk,
};
use crate::llm::{
    classify_instructions, CandidateTask, CandidateTopic, ClassifierLlm, ClassifyPrompt,
    WindowItem,
};
use crate::lock::LeaseLock;
use crate::schema::{self, Decision, TaskChoice, TopicChoice};
use crate::scope::SessionScope;

/// Stable topic greetings route into without an LLM call.
pub const SMALL_TALK_TOPIC: &str = "Small Talk";

/// Error tag recorded when the deterministic fallback handled a timeout.
pub const FALLBACK_LLM_TIMEOUT: &str = "fallback:llm_timeout";
/// Terminal error recorded when a summary could not be produced.
pub const SUMMARY_MISSING: &str = "summary_missing";

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub interval: Duration,
    pub max_attempts: i64,
    pub window_size: usize,
    pub lookback_logs: usize,
    pub topic_sim_threshold: f32,
    pub task_sim_threshold: f32,
    pub max_sessions_per_cycle: usize,
    pub routing_max_items: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 3,
            window_size: 24,
            lookback_logs: 80,
            topic_sim_threshold: 0.78,
            task_sim_threshold: 0.80,
            max_sessions_per_cycle: 50,
            routing_max_items: clawboard_types::routing::DEFAULT_MAX_ITEMS,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    pub sessions_processed: usize,
    pub sessions_failed: usize,
    pub logs_patched: usize,
}

/// Resolved routing for one bundle.
struct Resolution {
    topic_id: String,
    topic_name: String,
    task_id: Option<String>,
    task_title: Option<String>,
    /// Tag recorded in `classificationError` (fallback paths).
    error_tag: Option<String>,
    /// Per-log summaries from the model, if any.
    summaries: HashMap<String, String>,
    used_llm: bool,
}

pub struct Classifier {
    store: Arc<Store>,
    ingest: Arc<IngestService>,
    engine: Arc<SearchEngine>,
    llm: Option<Arc<dyn ClassifierLlm>>,
    gate: Box<dyn CreationGate>,
    audit: GateAudit,
    lock: LeaseLock,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(
        store: Arc<Store>,
        ingest: Arc<IngestService>,
        engine: Arc<SearchEngine>,
        llm: Option<Arc<dyn ClassifierLlm>>,
        gate: Box<dyn CreationGate>,
        audit: GateAudit,
        lock: LeaseLock,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            store,
            ingest,
            engine,
            llm,
            gate,
            audit,
            lock,
            config,
        }
    }

    /// Run one full cycle under the single-flight lock.
    pub async fn run_cycle(&self) -> Result<CycleReport, ClassifierError> {
        if !self.lock.acquire()? {
            return Err(ClassifierError::LockHeld);
        }
        let result = self.cycle_inner().await;
        self.lock.release();
        result
    }

    async fn cycle_inner(&self) -> Result<CycleReport, ClassifierError> {
        let mut report = CycleReport::default();

        // Page pending conversations and group them by session key.
        let mut session_keys: Vec<String> = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut query = LogQuery::new(500);
            query.classification_status = Some(ClassificationStatus::Pending);
            query.log_type = Some(LogType::Conversation);
            query.ascending = true;
            query.offset = offset;
            let page = self.store.read(|conn| logs::list(conn, &query))?;
            let page_len = page.len();
            for entry in page {
                if let Some(key) = entry.session_key() {
                    if !session_keys.iter().any(|k| k == key) {
                        session_keys.push(key.to_string());
                    }
                }
            }
            if page_len < 500 || offset >= 5000 {
                break;
            }
            offset += 500;
        }
        session_keys.truncate(self.config.max_sessions_per_cycle);

        for session_key in session_keys {
            match self.classify_session(&session_key).await {
                Ok(patched) => {
                    report.sessions_processed += 1;
                    report.logs_patched += patched;
                }
                Err(err) => {
                    // Per-session failure is isolated; other sessions continue.
                    warn!(session_key = %session_key, error = %err, "session classification failed");
                    report.sessions_failed += 1;
                }
            }
        }
        info!(
            sessions = report.sessions_processed,
            failed = report.sessions_failed,
            patched = report.logs_patched,
            "classifier cycle complete"
        );
        Ok(report)
    }

    /// Classify the oldest pending bundle of one session. Returns the
    /// number of logs patched.
    pub async fn classify_session(&self, session_key: &str) -> Result<usize, ClassifierError> {
        let mut query = LogQuery::new(self.config.lookback_logs);
        query.session_key = Some(session_key.to_string());
        query.ascending = true;
        let ctx_logs = self.store.read(|conn| logs::list(conn, &query))?;

        let conversations: Vec<LogEntry> = ctx_logs
            .iter()
            .filter(|e| e.log_type == LogType::Conversation)
            .cloned()
            .collect();
        if conversations.is_empty() {
            return Ok(0);
        }
        let window_start = conversations.len().saturating_sub(self.config.window_size);
        let window = &conversations[window_start..];

        let Some(anchor) = window
            .iter()
            .position(|e| e.classification_status == ClassificationStatus::Pending)
        else {
            return Ok(0);
        };
        let (start, end) = bundle_range(window, anchor);
        let bundle: Vec<LogEntry> = window[start..end].to_vec();

        // Pending members of the bundle plus pending tool traces inside the
        // bundle's time range.
        let bundle_start_ts = bundle.first().map(|e| e.created_at.clone()).unwrap_or_default();
        let bundle_end_ts = bundle.last().map(|e| e.created_at.clone()).unwrap_or_default();
        let mut pending: Vec<LogEntry> = bundle
            .iter()
            .filter(|e| e.classification_status == ClassificationStatus::Pending)
            .cloned()
            .collect();
        for entry in &ctx_logs {
            if entry.log_type == LogType::Action
                && entry.classification_status == ClassificationStatus::Pending
                && entry.created_at >= bundle_start_ts
                && entry.created_at <= bundle_end_ts
            {
                pending.push(entry.clone());
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }
        if pending
            .iter()
            .all(|e| e.classification_attempts >= self.config.max_attempts)
        {
            debug!(session_key, "all bundle logs exhausted attempts, skipping");
            return Ok(0);
        }
        pending.retain(|e| e.classification_attempts < self.config.max_attempts);

        // Rows ingested before the current filter set may still carry
        // filterable control-plane noise; settle those terminally first.
        let mut patched = 0usize;
        let mut routable: Vec<LogEntry> = Vec::new();
        for entry in pending {
            match clawboard_ingest::evaluate_filters(&append_shape(&entry)) {
                Some(outcome) => {
                    self.ingest.patch(
                        &entry.id,
                        LogPatch {
                            topic_id: if outcome.detach { Some(None) } else { None },
                            task_id: if outcome.detach { Some(None) } else { None },
                            classification_status: Some(outcome.status),
                            classification_attempts: Some(entry.classification_attempts + 1),
                            classification_error: Some(Some(outcome.reason.to_string())),
                            ..Default::default()
                        },
                    )?;
                    patched += 1;
                }
                None => routable.push(entry),
            }
        }
        if routable.is_empty() {
            return Ok(patched);
        }

        let scope = SessionScope::parse(session_key);
        let anchor_text = bundle
            .iter()
            .find(|e| is_user_turn(e))
            .map(|e| sanitize_log_text(&e.content))
            .unwrap_or_else(|| {
                bundle
                    .first()
                    .map(|e| sanitize_log_text(&e.content))
                    .unwrap_or_default()
            });

        let resolution = match self.resolve(session_key, &scope, &bundle, &anchor_text).await {
            Ok(resolution) => resolution,
            Err(err @ (ClassifierError::Llm(_) | ClassifierError::InvalidResponse(_))) => {
                // Record the attempt; the log turns terminal at the cap and
                // stays pending (retryable) below it.
                warn!(session_key, error = %err, "llm classification failed");
                for entry in &routable {
                    let attempts = entry.classification_attempts + 1;
                    let terminal = attempts >= self.config.max_attempts;
                    self.ingest.patch(
                        &entry.id,
                        LogPatch {
                            classification_status: terminal
                                .then_some(ClassificationStatus::Failed),
                            classification_attempts: Some(attempts),
                            classification_error: Some(Some(err.to_string())),
                            ..Default::default()
                        },
                    )?;
                }
                return Ok(patched + routable.len());
            }
            Err(err) => return Err(err),
        };

        patched += self.apply(&resolution, &routable).await?;

        // Remember the decision for low-signal continuity.
        let decision = RoutingDecision {
            ts: now_iso(),
            topic_id: resolution.topic_id.clone(),
            topic_name: resolution.topic_name.clone(),
            task_id: resolution.task_id.clone(),
            task_title: resolution.task_title.clone(),
            anchor: clip(&anchor_text, 200),
        };
        let max_items = self.config.routing_max_items;
        let now = now_iso();
        self.store.write(|conn| {
            routing::append_decision(conn, session_key, decision.clone(), max_items, &now)
                .map(|_| ())
        })?;

        Ok(patched)
    }

    /// Decide the bundle's routing through the scope/continuity/small-talk
    /// ladder, falling through to retrieval + LLM.
    async fn resolve(
        &self,
        session_key: &str,
        scope: &SessionScope,
        bundle: &[LogEntry],
        anchor_text: &str,
    ) -> Result<Resolution, ClassifierError> {
        // Forced task scope decides everything.
        if let (Some(topic_id), Some(task_id)) = (scope.forced_topic(), scope.forced_task()) {
            let (topic_name, task_title) = self.store.read(|conn| {
                let name = topics::get(conn, topic_id)?.map(|t| t.name).unwrap_or_default();
                let title = tasks::get(conn, task_id)?.map(|t| t.title);
                Ok((name, title))
            })?;
            return Ok(Resolution {
                topic_id: topic_id.to_string(),
                topic_name,
                task_id: Some(task_id.to_string()),
                task_title,
                error_tag: None,
                summaries: HashMap::new(),
                used_llm: false,
            });
        }

        // Low-signal follow-ups stay with the session's last routing.
        if scope == &SessionScope::Free && is_low_signal(anchor_text) {
            let memory = self
                .store
                .read(|conn| routing::get(conn, session_key))?;
            if let Some(latest) = memory.as_ref().and_then(|m| m.latest().cloned()) {
                debug!(session_key, topic = %latest.topic_id, "low-signal continuity");
                return Ok(Resolution {
                    topic_id: latest.topic_id,
                    topic_name: latest.topic_name,
                    task_id: latest.task_id,
                    task_title: latest.task_title,
                    error_tag: None,
                    summaries: HashMap::new(),
                    used_llm: false,
                });
            }
        }

        // Greetings route to the stable small-talk topic without an LLM.
        if scope == &SessionScope::Free && window_is_small_talk(bundle) {
            let topic = self.ingest.upsert_topic(TopicUpsert {
                name: Some(SMALL_TALK_TOPIC.into()),
                created_by: Some(CreatedBy::Classifier),
                tags: Some(vec!["classified".into()]),
                ..Default::default()
            })?;
            return Ok(Resolution {
                topic_id: topic.id,
                topic_name: topic.name,
                task_id: None,
                task_title: None,
                error_tag: None,
                summaries: HashMap::new(),
                used_llm: false,
            });
        }

        // Retrieval over the bundle text, user turns weighted ahead of
        // assistant turns.
        let bundle_text = bundle_query_text(bundle);
        let all_topics = self.store.read(|conn| topics::list(conn))?;
        let candidate_topic_scope = scope.forced_topic().map(|t| t.to_string());
        let scoped_tasks = self.store.read(|conn| {
            tasks::list(conn, candidate_topic_scope.as_deref())
        })?;

        let outcome = self
            .engine
            .search(
                &all_topics,
                &scoped_tasks,
                &[],
                &SearchRequest {
                    query: bundle_text.clone(),
                    session_key: Some(session_key.to_string()),
                    allowed_space_ids: None,
                    limits: SearchLimits {
                        topics: 6,
                        tasks: 8,
                        logs: 1,
                    },
                },
            )
            .await;

        let topic_names: HashMap<&str, &str> = all_topics
            .iter()
            .map(|t| (t.id.as_str(), t.name.as_str()))
            .collect();
        let candidate_topics: Vec<CandidateTopic> = outcome
            .topics
            .iter()
            .filter_map(|hit| {
                topic_names.get(hit.id.as_str()).map(|name| CandidateTopic {
                    id: hit.id.clone(),
                    name: (*name).to_string(),
                    score: hit.score,
                })
            })
            .collect();
        let task_titles: HashMap<&str, &str> = scoped_tasks
            .iter()
            .map(|t| (t.id.as_str(), t.title.as_str()))
            .collect();
        let candidate_tasks: Vec<CandidateTask> = outcome
            .tasks
            .iter()
            .filter_map(|hit| {
                task_titles.get(hit.id.as_str()).map(|title| CandidateTask {
                    id: hit.id.clone(),
                    title: (*title).to_string(),
                    score: hit.score,
                })
            })
            .collect();

        let memory = self.store.read(|conn| routing::get(conn, session_key))?;
        let memory_items = memory.map(|m| m.items).unwrap_or_default();
        let continuity_hint = memory_items
            .last()
            .map(|d| format!("{} ({})", d.topic_name, d.topic_id));

        let decision = match &self.llm {
            Some(llm) => {
                let prompt = ClassifyPrompt {
                    window: bundle.iter().map(WindowItem::from_entry).collect(),
                    candidate_topics: candidate_topics.clone(),
                    candidate_tasks: candidate_tasks.clone(),
                    routing_memory: memory_items,
                    continuity_hint,
                    instructions: classify_instructions(),
                };
                match self.call_llm_validated(llm.as_ref(), &prompt).await {
                    Ok(decision) => Some((decision, None)),
                    Err(ClassifierError::LlmTimeout) => None,
                    Err(err) => return Err(err),
                }
            }
            None => None,
        };

        let (decision, error_tag, used_llm) = match decision {
            Some((decision, tag)) => (decision, tag, true),
            None => {
                // Deterministic fallback: derived names, no creation beyond
                // what the gate allows.
                let tag = self
                    .llm
                    .as_ref()
                    .map(|_| FALLBACK_LLM_TIMEOUT.to_string());
                (heuristic_decision(bundle), tag, false)
            }
        };

        self.settle_decision(
            scope,
            decision,
            &candidate_topics,
            &bundle_text,
            error_tag,
            used_llm,
        )
        .await
    }

    /// Strict-parse with exactly one repair attempt.
    async fn call_llm_validated(
        &self,
        llm: &dyn ClassifierLlm,
        prompt: &ClassifyPrompt,
    ) -> Result<Decision, ClassifierError> {
        let first = llm.classify(prompt, None).await?;
        match schema::parse_decision(&first) {
            Ok(decision) => Ok(decision),
            Err(ClassifierError::InvalidResponse(reason)) => {
                debug!(%reason, "llm response invalid, attempting repair");
                let second = llm.classify(prompt, Some(&reason)).await?;
                schema::parse_decision(&second)
            }
            Err(err) => Err(err),
        }
    }

    /// Apply anti-duplicate guardrails and the creation gate, then upsert
    /// the chosen topic/task.
    async fn settle_decision(
        &self,
        scope: &SessionScope,
        decision: Decision,
        candidate_topics: &[CandidateTopic],
        bundle_text: &str,
        error_tag: Option<String>,
        used_llm: bool,
    ) -> Result<Resolution, ClassifierError> {
        let mut topic_choice = decision.topic;

        // Forced topic scope overrides whatever the model proposed.
        if let Some(forced) = scope.forced_topic() {
            topic_choice = TopicChoice {
                id: Some(forced.to_string()),
                name: topic_choice.name,
                create: false,
            };
        }

        // Anti-dup: a confident retrieval hit wins over a create proposal.
        if let Some(best) = candidate_topics.first() {
            if best.score >= self.config.topic_sim_threshold {
                topic_choice = TopicChoice {
                    id: Some(best.id.clone()),
                    name: best.name.clone(),
                    create: false,
                };
            }
        }

        let topic = if let Some(id) = topic_choice
            .id
            .as_deref()
            .filter(|_| !topic_choice.create)
        {
            match self.store.read(|conn| topics::get(conn, id))? {
                Some(topic) => {
                    // Reuse without renaming: only classifier tags merge in.
                    self.ingest.upsert_topic(TopicUpsert {
                        id: Some(topic.id.clone()),
                        tags: Some(vec!["classified".into()]),
                        ..Default::default()
                    })?
                }
                None => self.create_topic_gated(&topic_choice.name, candidate_topics, bundle_text)?,
            }
        } else {
            self.create_topic_gated(&topic_choice.name, candidate_topics, bundle_text)?
        };

        // Task settlement within the chosen topic.
        let mut task_row = None;
        if let Some(forced_task) = scope.forced_task() {
            task_row = self.store.read(|conn| tasks::get(conn, forced_task))?;
        } else if let Some(choice) = decision.task {
            task_row = self.settle_task(&topic.id, choice, bundle_text).await?;
        }

        Ok(Resolution {
            topic_id: topic.id,
            topic_name: topic.name,
            task_id: task_row.as_ref().map(|t| t.id.clone()),
            task_title: task_row.map(|t| t.title),
            error_tag,
            summaries: decision.summaries,
            used_llm,
        })
    }

    fn create_topic_gated(
        &self,
        name: &str,
        candidate_topics: &[CandidateTopic],
        bundle_text: &str,
    ) -> Result<clawboard_types::Topic, ClassifierError> {
        let name = if name.trim().is_empty() { "General" } else { name.trim() };
        let gate_decision = self.gate.decide(GateKind::Topic, name, bundle_text);
        self.audit.record(GateKind::Topic, name, &gate_decision);
        if gate_decision.allow {
            Ok(self.ingest.upsert_topic(TopicUpsert {
                name: Some(name.to_string()),
                created_by: Some(CreatedBy::Classifier),
                tags: Some(vec!["classified".into()]),
                ..Default::default()
            })?)
        } else if let Some(best) = candidate_topics.first() {
            // Denied creates land on the best existing candidate.
            Ok(self.ingest.upsert_topic(TopicUpsert {
                id: Some(best.id.clone()),
                tags: Some(vec!["classified".into()]),
                ..Default::default()
            })?)
        } else {
            Ok(self.ingest.upsert_topic(TopicUpsert {
                name: Some("General".into()),
                created_by: Some(CreatedBy::Classifier),
                tags: Some(vec!["classified".into()]),
                ..Default::default()
            })?)
        }
    }

    async fn settle_task(
        &self,
        topic_id: &str,
        choice: TaskChoice,
        bundle_text: &str,
    ) -> Result<Option<clawboard_types::Task>, ClassifierError> {
        // Reuse path: the id must belong to the chosen topic.
        if let Some(id) = choice.id.as_deref().filter(|_| !choice.create) {
            if let Some(task) = self.store.read(|conn| tasks::get(conn, id))? {
                if task.topic_id.as_deref() == Some(topic_id) {
                    return Ok(Some(task));
                }
                debug!(task_id = id, "rejected task from another topic");
            }
        }
        // Retrieval guard: a confident existing task wins over a create.
        let scoped = self.store.read(|conn| tasks::list(conn, Some(topic_id)))?;
        let outcome = self
            .engine
            .search(
                &[],
                &scoped,
                &[],
                &SearchRequest {
                    query: bundle_text.to_string(),
                    session_key: None,
                    allowed_space_ids: None,
                    limits: SearchLimits {
                        topics: 1,
                        tasks: 4,
                        logs: 1,
                    },
                },
            )
            .await;
        if let Some(best) = outcome.tasks.first() {
            if best.score >= self.config.task_sim_threshold {
                return Ok(self
                    .store
                    .read(|conn| tasks::get(conn, &best.id))?);
            }
        }
        let Some(title) = choice.title.as_deref().filter(|_| choice.create) else {
            return Ok(None);
        };
        let gate_decision = self.gate.decide(GateKind::Task, title, bundle_text);
        self.audit.record(GateKind::Task, title, &gate_decision);
        if !gate_decision.allow {
            return Ok(None);
        }
        Ok(Some(self.ingest.upsert_task(TaskUpsert {
            topic_id: Some(topic_id.to_string()),
            title: Some(title.to_string()),
            created_by: Some(CreatedBy::Classifier),
            ..Default::default()
        })?))
    }

    /// Patch every routable log in the bundle with the resolution.
    async fn apply(
        &self,
        resolution: &Resolution,
        routable: &[LogEntry],
    ) -> Result<usize, ClassifierError> {
        let mut patched = 0usize;
        for entry in routable {
            let summary = match self.summary_for(resolution, entry).await {
                Some(summary) => Some(summary),
                None if entry.log_type == LogType::Conversation && resolution.used_llm => {
                    // Summary repair failed twice: terminal for this log.
                    self.ingest.patch(
                        &entry.id,
                        LogPatch {
                            classification_status: Some(ClassificationStatus::Failed),
                            classification_attempts: Some(entry.classification_attempts + 1),
                            classification_error: Some(Some(SUMMARY_MISSING.into())),
                            ..Default::default()
                        },
                    )?;
                    patched += 1;
                    continue;
                }
                None => None,
            };

            self.ingest.patch(
                &entry.id,
                LogPatch {
                    topic_id: Some(Some(resolution.topic_id.clone())),
                    task_id: Some(resolution.task_id.clone()),
                    summary,
                    classification_status: Some(ClassificationStatus::Classified),
                    classification_attempts: Some(entry.classification_attempts + 1),
                    classification_error: Some(resolution.error_tag.clone()),
                    ..Default::default()
                },
            )?;
            patched += 1;
        }
        Ok(patched)
    }

    /// Summary from the model output, repaired once, or derived locally on
    /// non-LLM paths.
    async fn summary_for(&self, resolution: &Resolution, entry: &LogEntry) -> Option<String> {
        if let Some(summary) = resolution.summaries.get(&entry.id) {
            let clipped = clip(sanitize_log_text(summary).as_str(), 56);
            if !clipped.is_empty() {
                return Some(clipped);
            }
        }
        if resolution.used_llm && entry.log_type == LogType::Conversation {
            if let Some(llm) = &self.llm {
                match llm.summarize(&entry.content).await {
                    Ok(summary) => {
                        let clipped = clip(sanitize_log_text(&summary).as_str(), 56);
                        if !clipped.is_empty() {
                            return Some(clipped);
                        }
                    }
                    Err(err) => warn!(log_id = %entry.id, error = %err, "summary repair failed"),
                }
            }
            return None;
        }
        // Heuristic paths keep whatever the producer sent, else derive one.
        let existing = entry.summary.as_deref().unwrap_or("");
        let base = if existing.is_empty() {
            entry.content.as_str()
        } else {
            existing
        };
        let clipped = clip(sanitize_log_text(base).as_str(), 56);
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Bundle text for retrieval: user turns carry the intent, assistant turns
/// only trail context, clipped hard to avoid contaminating the embedding.
fn bundle_query_text(bundle: &[LogEntry]) -> String {
    let mut parts = Vec::new();
    for entry in bundle {
        let text = sanitize_log_text(&entry.content);
        if text.is_empty() {
            continue;
        }
        if is_user_turn(entry) {
            parts.push(text);
        } else {
            parts.push(clip(&text, 200));
        }
    }
    let joined = parts.join("\n");
    // Keep the tail; the newest turns matter most.
    let chars: Vec<char> = joined.chars().collect();
    if chars.len() > 6000 {
        chars[chars.len() - 6000..].iter().collect()
    } else {
        joined
    }
}

fn heuristic_decision(bundle: &[LogEntry]) -> Decision {
    let name = derive_topic_name(bundle);
    let task = derive_task_title(bundle).map(|title| TaskChoice {
        id: None,
        title: Some(title),
        create: true,
    });
    Decision {
        topic: TopicChoice {
            id: None,
            name,
            create: true,
        },
        task,
        summaries: HashMap::new(),
    }
}

/// Re-shape a stored entry for the shared ingest filters.
fn append_shape(entry: &LogEntry) -> LogAppend {
    LogAppend {
        log_type: Some(entry.log_type),
        content: Some(entry.content.clone()),
        summary: entry.summary.clone(),
        raw: entry.raw.clone(),
        agent_id: entry.agent_id.clone(),
        agent_label: entry.agent_label.clone(),
        source: entry.source.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::HeuristicGate;
    use crate::llm::ScriptedLlm;
    use clawboard_embeddings::{EmbeddingProvider, HashingEmbedder};
    use clawboard_events::EventHub;
    use clawboard_types::LogSource;
    use clawboard_vector::{LocalVectorIndex, ReindexQueue, VectorIndex};

    struct Fixture {
        store: Arc<Store>,
        ingest: Arc<IngestService>,
        engine: Arc<SearchEngine>,
        dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let hub = Arc::new(EventHub::new(100, None));
        let reindex = Arc::new(ReindexQueue::new(dir.path().join("reindex.jsonl")));
        let ingest = Arc::new(IngestService::new(store.clone(), hub, reindex));
        let index = Arc::new(LocalVectorIndex::open_in_memory().unwrap());
        let embedder = Arc::new(HashingEmbedder::new(64));
        let engine = Arc::new(SearchEngine::new(index, embedder));
        Fixture {
            store,
            ingest,
            engine,
            dir,
        }
    }

    impl Fixture {
        fn classifier(&self, llm: Option<Arc<dyn ClassifierLlm>>) -> Classifier {
            self.classifier_with_engine(llm, self.engine.clone())
        }

        fn classifier_with_engine(
            &self,
            llm: Option<Arc<dyn ClassifierLlm>>,
            engine: Arc<SearchEngine>,
        ) -> Classifier {
            Classifier::new(
                self.store.clone(),
                self.ingest.clone(),
                engine,
                llm,
                Box::new(HeuristicGate),
                GateAudit::new(Some(self.dir.path().join("gate-audit.jsonl"))),
                LeaseLock::new(
                    self.dir.path().join("classifier.lock"),
                    Duration::from_secs(60),
                ),
                ClassifierConfig::default(),
            )
        }
    }

    fn append_turn(
        ingest: &IngestService,
        session: &str,
        agent: &str,
        content: &str,
        message_id: &str,
    ) -> LogEntry {
        ingest
            .append(
                LogAppend {
                    log_type: Some(LogType::Conversation),
                    content: Some(content.into()),
                    agent_id: Some(agent.into()),
                    source: Some(LogSource {
                        channel: Some("discord".into()),
                        session_key: Some(session.into()),
                        message_id: Some(message_id.into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                None,
            )
            .unwrap()
    }

    fn decision_json(topic_name: &str, create: bool, log_id: &str, summary: &str) -> String {
        format!(
            r#"{{"topic": {{"id": null, "name": "{topic_name}", "create": {create}}},
                 "task": null,
                 "summaries": [{{"id": "{log_id}", "summary": "{summary}"}}]}}"#
        )
    }

    #[tokio::test]
    async fn llm_decision_routes_and_summarizes_the_bundle() {
        let fx = fixture().await;
        let entry = append_turn(
            &fx.ingest,
            "channel:general",
            "user",
            "Please fix the billing invoice export, it returns 500",
            "m1",
        );
        let llm: Arc<dyn ClassifierLlm> = Arc::new(ScriptedLlm::new(vec![Ok(decision_json(
            "Billing",
            true,
            &entry.id,
            "Fix invoice export 500",
        ))]));
        let classifier = fx.classifier(Some(llm));

        let patched = classifier
            .classify_session("channel:general")
            .await
            .unwrap();
        assert_eq!(patched, 1);

        let row = fx
            .store
            .read(|conn| logs::get(conn, &entry.id))
            .unwrap()
            .unwrap();
        assert_eq!(row.classification_status, ClassificationStatus::Classified);
        assert_eq!(row.classification_attempts, 1);
        assert_eq!(row.summary.as_deref(), Some("Fix invoice export 500"));
        let topic = fx
            .store
            .read(|conn| topics::get(conn, row.topic_id.as_deref().unwrap()))
            .unwrap()
            .unwrap();
        assert_eq!(topic.name, "Billing");
        assert_eq!(topic.created_by, CreatedBy::Classifier);

        // Routing memory recorded the decision.
        let memory = fx
            .store
            .read(|conn| routing::get(conn, "channel:general"))
            .unwrap()
            .unwrap();
        assert_eq!(memory.latest().unwrap().topic_id, topic.id);
    }

    #[tokio::test]
    async fn invalid_llm_reply_is_repaired_once() {
        let fx = fixture().await;
        let entry = append_turn(
            &fx.ingest,
            "channel:general",
            "user",
            "Investigate the flaky deploy pipeline",
            "m1",
        );
        let llm: Arc<dyn ClassifierLlm> = Arc::new(ScriptedLlm::new(vec![
            Ok("not json at all".into()),
            Ok(decision_json("Deploys", true, &entry.id, "Flaky deploy pipeline")),
        ]));
        let classifier = fx.classifier(Some(llm));
        classifier
            .classify_session("channel:general")
            .await
            .unwrap();
        let row = fx
            .store
            .read(|conn| logs::get(conn, &entry.id))
            .unwrap()
            .unwrap();
        assert_eq!(row.classification_status, ClassificationStatus::Classified);
    }

    #[tokio::test]
    async fn timeout_falls_back_to_heuristics_with_tag() {
        let fx = fixture().await;
        let entry = append_turn(
            &fx.ingest,
            "channel:general",
            "user",
            "Please implement retry logic for the NIMBUS webhook",
            "m1",
        );
        let llm: Arc<dyn ClassifierLlm> =
            Arc::new(ScriptedLlm::new(vec![Err(ClassifierError::LlmTimeout)]));
        let classifier = fx.classifier(Some(llm));
        classifier
            .classify_session("channel:general")
            .await
            .unwrap();
        let row = fx
            .store
            .read(|conn| logs::get(conn, &entry.id))
            .unwrap()
            .unwrap();
        assert_eq!(row.classification_status, ClassificationStatus::Classified);
        assert_eq!(
            row.classification_error.as_deref(),
            Some(FALLBACK_LLM_TIMEOUT)
        );
        assert!(row.topic_id.is_some());
    }

    #[tokio::test]
    async fn small_talk_routes_without_llm() {
        let fx = fixture().await;
        // A scripted LLM that would fail the test if called.
        let llm: Arc<dyn ClassifierLlm> = Arc::new(ScriptedLlm::new(vec![Err(
            ClassifierError::Llm("small-talk fast path should not call the llm".into()),
        )]));
        let classifier = fx.classifier(Some(llm));
        let entry = append_turn(&fx.ingest, "channel:general", "user", "hey, how are you?", "m1");
        classifier
            .classify_session("channel:general")
            .await
            .unwrap();
        let row = fx
            .store
            .read(|conn| logs::get(conn, &entry.id))
            .unwrap()
            .unwrap();
        let topic = fx
            .store
            .read(|conn| topics::get(conn, row.topic_id.as_deref().unwrap()))
            .unwrap()
            .unwrap();
        assert_eq!(topic.name, SMALL_TALK_TOPIC);
        assert_eq!(row.classification_status, ClassificationStatus::Classified);
    }

    #[tokio::test]
    async fn low_signal_follow_up_uses_routing_memory() {
        let fx = fixture().await;
        let topic = fx
            .ingest
            .upsert_topic(TopicUpsert {
                name: Some("Continuity".into()),
                ..Default::default()
            })
            .unwrap();
        let now = now_iso();
        fx.store
            .write(|conn| {
                routing::append_decision(
                    conn,
                    "channel:general",
                    RoutingDecision {
                        ts: now.clone(),
                        topic_id: topic.id.clone(),
                        topic_name: topic.name.clone(),
                        task_id: None,
                        task_title: None,
                        anchor: "Fix the login redirect bug.".into(),
                    },
                    8,
                    &now,
                )
                .map(|_| ())
            })
            .unwrap();

        let entry = append_turn(&fx.ingest, "channel:general", "user", "yes please", "m1");
        fx.classifier(None)
            .classify_session("channel:general")
            .await
            .unwrap();
        let row = fx
            .store
            .read(|conn| logs::get(conn, &entry.id))
            .unwrap()
            .unwrap();
        assert_eq!(row.topic_id.as_deref(), Some(topic.id.as_str()));
    }

    #[tokio::test]
    async fn forced_task_scope_routes_without_llm() {
        let fx = fixture().await;
        let topic = fx
            .ingest
            .upsert_topic(TopicUpsert {
                name: Some("Billing".into()),
                ..Default::default()
            })
            .unwrap();
        let task = fx
            .ingest
            .upsert_task(TaskUpsert {
                topic_id: Some(topic.id.clone()),
                title: Some("Rotate keys".into()),
                ..Default::default()
            })
            .unwrap();
        let session = format!("clawboard:task:{}:{}", topic.id, task.id);
        let entry = append_turn(&fx.ingest, &session, "user", "progress update on this work", "m1");
        fx.classifier(None).classify_session(&session).await.unwrap();
        let row = fx
            .store
            .read(|conn| logs::get(conn, &entry.id))
            .unwrap()
            .unwrap();
        assert_eq!(row.topic_id.as_deref(), Some(topic.id.as_str()));
        assert_eq!(row.task_id.as_deref(), Some(task.id.as_str()));
    }

    #[tokio::test]
    async fn confident_candidate_blocks_duplicate_topic_creation() {
        let fx = fixture().await;
        let existing = fx
            .ingest
            .upsert_topic(TopicUpsert {
                name: Some("Billing Invoices".into()),
                ..Default::default()
            })
            .unwrap();
        // Seed the vector index so retrieval is confident about the topic.
        let embedder = HashingEmbedder::new(64);
        let index = LocalVectorIndex::open_in_memory().unwrap();
        let vector = embedder.embed("Billing Invoices").await.unwrap();
        index.upsert("topic", &existing.id, &vector).await.unwrap();
        let engine = Arc::new(SearchEngine::new(Arc::new(index), Arc::new(embedder)));

        // The turn restates the topic name, so retrieval scores it above
        // the reuse threshold and the proposed duplicate must be ignored.
        let entry = append_turn(
            &fx.ingest,
            "channel:general",
            "user",
            "Billing Invoices",
            "m1",
        );
        let llm: Arc<dyn ClassifierLlm> = Arc::new(ScriptedLlm::new(vec![Ok(decision_json(
            "Billing Invoices Duplicate",
            true,
            &entry.id,
            "Billing invoices broken",
        ))]));
        let classifier = fx.classifier_with_engine(Some(llm), engine);
        classifier.classify_session("channel:general").await.unwrap();

        let row = fx
            .store
            .read(|conn| logs::get(conn, &entry.id))
            .unwrap()
            .unwrap();
        assert_eq!(row.topic_id.as_deref(), Some(existing.id.as_str()));
        // No duplicate topic was created.
        let all = fx.store.read(|conn| topics::list(conn)).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_bundles_are_skipped() {
        let fx = fixture().await;
        let entry = append_turn(&fx.ingest, "channel:general", "user", "route me somewhere", "m1");
        fx.ingest
            .patch(
                &entry.id,
                LogPatch {
                    classification_attempts: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        let patched = fx
            .classifier(None)
            .classify_session("channel:general")
            .await
            .unwrap();
        assert_eq!(patched, 0);
        let row = fx
            .store
            .read(|conn| logs::get(conn, &entry.id))
            .unwrap()
            .unwrap();
        assert_eq!(row.classification_status, ClassificationStatus::Pending);
    }

    #[tokio::test]
    async fn run_cycle_respects_the_lock() {
        let fx = fixture().await;
        let classifier = fx.classifier(None);
        assert!(classifier.lock.acquire().unwrap());
        assert!(matches!(
            classifier.run_cycle().await,
            Err(ClassifierError::LockHeld)
        ));
        classifier.lock.release();
        assert!(classifier.run_cycle().await.is_ok());
    }
}
