//! # clawboard-classifier
//!
//! The asynchronous session classifier: bundles recent conversation turns,
//! resolves them against existing topics/tasks through hybrid retrieval and
//! an LLM gate with anti-duplicate guardrails, and patches stable routing
//! back through the ingest service. Timeouts and malformed model output
//! degrade to a deterministic heuristic ladder instead of failing requests.

pub mod bundle;
pub mod error;
pub mod gate;
pub mod heuristics;
pub mod llm;
pub mod lock;
pub mod schema;
pub mod scope;
pub mod worker;

pub use bundle::{bundle_range, is_user_turn};
pub use error::ClassifierError;
pub use gate::{CreationGate, GateAudit, GateDecision, GateKind, HeuristicGate};
pub use heuristics::{is_affirmation, is_low_signal, valid_task_title};
pub use llm::{ClassifierLlm, ClassifyPrompt, HttpLlm, HttpLlmConfig, ScriptedLlm};
pub use lock::LeaseLock;
pub use schema::{parse_decision, Decision};
pub use scope::SessionScope;
pub use worker::{Classifier, ClassifierConfig, CycleReport, FALLBACK_LLM_TIMEOUT, SMALL_TALK_TOPIC};
