//! Trait seams between the engine and its collaborators.
//!
//! The explanation collaborator lives in `placedrill-collab`, persistent
//! state stores in `placedrill-store`, and the content bank in
//! `placedrill-content`. The engine itself holds no ambient state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{
    AssessmentItem, AttemptRecord, DetourBudget, LearnerSession, RevisitKind, RevisitTicket,
    RuleRemediation, UiLang,
};

// ---------------------------------------------------------------------------
// Explanation collaborator
// ---------------------------------------------------------------------------

/// Request to explain a wrong answer and possibly reclassify it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainRequest {
    /// The question as shown to the learner.
    pub prompt: String,
    /// The displayed correct answer.
    pub canonical: String,
    /// The learner's answer after normalization.
    pub user_answer: String,
    /// Language for the explanation text; examples stay English.
    pub ui_lang: UiLang,
}

/// Collaborator response: explanation text plus a flip signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub text: String,
    /// True when the answer should be accepted as correct after all.
    pub flip: bool,
}

/// Capability to explain a miss and optionally revise the verdict.
///
/// Implementations may be slow or unavailable; the engine bounds every
/// call with a timeout and falls back to a plain incorrect verdict.
#[async_trait]
pub trait Explainer: Send + Sync {
    /// Human-readable collaborator name (e.g. "gemini").
    fn name(&self) -> &str;

    async fn explain(&self, request: &ExplainRequest) -> anyhow::Result<ExplainResponse>;
}

// ---------------------------------------------------------------------------
// Content store
// ---------------------------------------------------------------------------

/// Read-only view over imported placement and exercise content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Placement item at a 0-based position in the fixed order.
    async fn placement_item(&self, position: usize) -> anyhow::Result<Option<AssessmentItem>>;

    /// Total number of placement items.
    async fn placement_len(&self) -> anyhow::Result<usize>;

    /// Remediation content for a rule, if any exists.
    async fn remediation(&self, rule_key: &str) -> anyhow::Result<Option<RuleRemediation>>;

    /// Any item (placement or exercise) by id.
    async fn item(&self, item_id: &str) -> anyhow::Result<Option<AssessmentItem>>;
}

// ---------------------------------------------------------------------------
// State store
// ---------------------------------------------------------------------------

/// Durable state: sessions, attempts, tickets, budgets.
///
/// Ticket upserts are keyed (learner, rule, kind) and coalesce onto an
/// existing pending ticket, so at-least-once creation is safe.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_session(&self, learner_id: &str)
        -> Result<Option<LearnerSession>, StoreError>;

    async fn save_session(&self, session: &LearnerSession) -> Result<(), StoreError>;

    /// Append one attempt to the audit trail. Never mutates prior rows.
    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<(), StoreError>;

    async fn attempts_for(&self, learner_id: &str) -> Result<Vec<AttemptRecord>, StoreError>;

    /// Create or extend the pending ticket for (learner, rule, kind).
    async fn upsert_ticket(&self, ticket: &RevisitTicket) -> Result<(), StoreError>;

    /// All pending tickets for one learner, due or not.
    async fn pending_tickets(&self, learner_id: &str)
        -> Result<Vec<RevisitTicket>, StoreError>;

    /// Pending tickets across all learners with `due_at <= now`, ordered
    /// by due-at ascending.
    async fn due_tickets(&self, now: DateTime<Utc>) -> Result<Vec<RevisitTicket>, StoreError>;

    /// Commit a delivered ticket: pending -> fired. A no-op when no
    /// pending ticket matches, so confirmations are idempotent.
    async fn mark_fired(
        &self,
        learner_id: &str,
        rule_key: &str,
        kind: RevisitKind,
    ) -> Result<(), StoreError>;

    async fn cancel_ticket(
        &self,
        learner_id: &str,
        rule_key: &str,
        kind: RevisitKind,
    ) -> Result<(), StoreError>;

    /// Budget for (learner, rule); a fresh zero budget when none stored.
    async fn load_budget(
        &self,
        learner_id: &str,
        rule_key: &str,
    ) -> Result<DetourBudget, StoreError>;

    async fn save_budget(&self, budget: &DetourBudget) -> Result<(), StoreError>;
}
