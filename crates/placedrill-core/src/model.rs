//! Core data model types for placedrill.
//!
//! These are the fundamental types the entire placedrill system uses to
//! represent assessment content, learner sessions, graded attempts, and
//! scheduled recheck obligations.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// UI language for a learner. Content itself stays English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UiLang {
    En,
    #[default]
    Uk,
}

impl fmt::Display for UiLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiLang::En => write!(f, "en"),
            UiLang::Uk => write!(f, "uk"),
        }
    }
}

impl FromStr for UiLang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "eng" | "english" => Ok(UiLang::En),
            "uk" | "ua" | "ukrainian" => Ok(UiLang::Uk),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// A text with an English base and an optional Ukrainian translation.
///
/// Rule explanations are localizable; examples and exercise content are
/// English-only by contract.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Localized {
    pub en: String,
    #[serde(default)]
    pub uk: Option<String>,
}

impl Localized {
    pub fn en(text: &str) -> Self {
        Self {
            en: text.to_string(),
            uk: None,
        }
    }

    /// Resolve for a UI language, falling back to English.
    pub fn get(&self, lang: UiLang) -> &str {
        match lang {
            UiLang::En => &self.en,
            UiLang::Uk => self.uk.as_deref().unwrap_or(&self.en),
        }
    }
}

/// Kind of an assessment item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Mcq,
    Multiselect,
    #[serde(alias = "free_text")]
    Freetext,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Mcq => write!(f, "mcq"),
            ItemKind::Multiselect => write!(f, "multiselect"),
            ItemKind::Freetext => write!(f, "freetext"),
        }
    }
}

/// An immutable content unit: one question with its accepted answers.
///
/// MCQ items carry exactly 4 options; multiselect canonical is the
/// option-order-joined correct subset; free-text items rely on the
/// canonical plus accepted variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentItem {
    /// Unique identifier for this item.
    pub id: String,
    /// Rule this item practices (e.g. "unit_12").
    pub rule_key: String,
    pub kind: ItemKind,
    /// English instruction shown before the prompt.
    #[serde(default)]
    pub instruction: Option<String>,
    /// The question text (English).
    pub prompt: String,
    /// The displayed correct answer.
    pub canonical: String,
    /// Alternative answers accepted after normalization.
    #[serde(default)]
    pub accepted_variants: Vec<String>,
    /// Option list for mcq/multiselect.
    #[serde(default)]
    pub options: Vec<String>,
    /// Deterministic ordering field within a rule's exercise pool.
    #[serde(default)]
    pub sequence: u32,
}

/// A rule's remediation content: explanation, examples, exercise pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRemediation {
    pub rule_key: String,
    #[serde(default)]
    pub title: Option<String>,
    pub explanation: Localized,
    #[serde(default)]
    pub short_explanation: Option<Localized>,
    /// English-only example sentences.
    #[serde(default)]
    pub examples: Vec<String>,
    /// Ordered exercise pool, sorted by `sequence`.
    #[serde(default)]
    pub exercises: Vec<AssessmentItem>,
}

/// Progress inside a detour remediation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetourProgress {
    pub rule_key: String,
    /// Item ids of the current batch, in serving order.
    pub queue: Vec<String>,
    /// Index of the exercise currently awaiting an answer.
    pub pos: usize,
    /// Which regeneration of this rule's batch this is (1-based).
    pub regeneration: u32,
    /// Phase to restore once the batch completes; `None` means return to
    /// the placement pointer.
    #[serde(default)]
    pub resume: Option<Box<Phase>>,
}

/// Progress inside an interleaved revisit/week-check prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisitProgress {
    pub rule_key: String,
    /// Exercise currently presented for the recheck.
    pub item_id: String,
    /// Main phase to resume after the recheck answer.
    pub resume: Box<Phase>,
}

/// Session state machine phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Onboarding,
    Placement,
    Detour(DetourProgress),
    AwaitingRevisit(RevisitProgress),
    WeeklyCheck(RevisitProgress),
    Completed,
}

impl Phase {
    /// Short label used in attempt records and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Onboarding => "onboarding",
            Phase::Placement => "placement",
            Phase::Detour(_) => "detour",
            Phase::AwaitingRevisit(_) => "revisit",
            Phase::WeeklyCheck(_) => "check",
            Phase::Completed => "completed",
        }
    }
}

/// One learner's authoritative session state.
///
/// Owned exclusively by the session state machine; created on first
/// interaction, mutated on every response, archived on completion but
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerSession {
    pub learner_id: String,
    pub ui_lang: UiLang,
    pub phase: Phase,
    /// Index of the next unanswered placement item.
    pub placement_pos: usize,
    /// Attempts submitted for the currently pending item.
    pub attempts_this_item: u32,
    /// Keys of (item, normalized answer) pairs already offered a flip
    /// evaluation; resubmitting the same wrong answer never re-triggers
    /// the collaborator.
    #[serde(default)]
    pub flip_checked: BTreeSet<String>,
    /// Item ids this learner has answered correctly.
    #[serde(default)]
    pub solved_items: BTreeSet<String>,
    /// Rules whose detour budget was exhausted without success.
    #[serde(default)]
    pub escalated_rules: BTreeSet<String>,
    /// Rules missed on a week-check; recorded, not retried.
    #[serde(default)]
    pub standing_gaps: BTreeSet<String>,
    /// Bumped on every committed mutation; used for the optimistic check
    /// around collaborator calls.
    pub revision: u64,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearnerSession {
    pub fn new(learner_id: &str, ui_lang: UiLang, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            ui_lang,
            phase: Phase::Onboarding,
            placement_pos: 0,
            attempts_this_item: 0,
            flip_checked: BTreeSet::new(),
            solved_items: BTreeSet::new(),
            escalated_rules: BTreeSet::new(),
            standing_gaps: BTreeSet::new(),
            revision: 0,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Key identifying a flip evaluation for one wrong answer to one item.
    pub fn flip_key(item_id: &str, normalized: &str) -> String {
        format!("{item_id}\u{1}{normalized}")
    }

    /// Record a mutation: bump the revision and the update timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.revision += 1;
        self.updated_at = now;
    }
}

/// Result of scoring one submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Correct,
    Incorrect,
    /// Initially wrong, reclassified correct by the explanation
    /// collaborator. Counts as correct for progression; flagged for audit.
    FlippedCorrect,
}

impl Outcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Correct | Outcome::FlippedCorrect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Correct => "correct",
            Outcome::Incorrect => "incorrect",
            Outcome::FlippedCorrect => "flipped-correct",
        }
    }
}

/// Append-only audit record for one submitted answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub learner_id: String,
    pub item_id: String,
    pub rule_key: String,
    /// Phase label at submission time (placement/detour/revisit/check).
    pub phase: String,
    pub raw_input: String,
    pub normalized_input: String,
    pub outcome: Outcome,
    /// Collaborator explanation text, when one was produced.
    #[serde(default)]
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Kind of a scheduled recheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevisitKind {
    /// Re-presented a couple of days after remediation.
    ShortDelay,
    /// Final retention signal one week out.
    WeekCheck,
}

impl RevisitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisitKind::ShortDelay => "short-delay",
            RevisitKind::WeekCheck => "week-check",
        }
    }
}

impl FromStr for RevisitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short-delay" => Ok(RevisitKind::ShortDelay),
            "week-check" => Ok(RevisitKind::WeekCheck),
            other => Err(format!("unknown revisit kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Fired,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Fired => "fired",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

/// A scheduled future recheck obligation.
///
/// Invariant: at most one pending ticket exists per (learner, rule, kind);
/// a new miss on an already-pending rule extends the existing ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisitTicket {
    pub learner_id: String,
    pub rule_key: String,
    pub kind: RevisitKind,
    pub due_at: DateTime<Utc>,
    pub status: TicketStatus,
}

impl RevisitTicket {
    pub fn pending(
        learner_id: &str,
        rule_key: &str,
        kind: RevisitKind,
        due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            rule_key: rule_key.to_string(),
            kind,
            due_at,
            status: TicketStatus::Pending,
        }
    }
}

/// Per (learner, rule) remediation counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetourBudget {
    pub learner_id: String,
    pub rule_key: String,
    pub regenerations_used: u32,
    /// Exercises issued in the most recent batch.
    pub last_batch_size: u32,
}

impl DetourBudget {
    pub fn new(learner_id: &str, rule_key: &str) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            rule_key: rule_key.to_string(),
            regenerations_used: 0,
            last_batch_size: 0,
        }
    }
}

/// Remediation content assembled for one detour round.
#[derive(Debug, Clone)]
pub struct RemediationBatch {
    pub rule_key: String,
    /// Explanation resolved for the learner's UI language.
    pub explanation: String,
    pub examples: Vec<String>,
    pub exercises: Vec<AssessmentItem>,
    /// 1-based regeneration ordinal for this rule.
    pub regeneration: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_lang_parse_and_display() {
        assert_eq!("en".parse::<UiLang>().unwrap(), UiLang::En);
        assert_eq!("English".parse::<UiLang>().unwrap(), UiLang::En);
        assert_eq!("ua".parse::<UiLang>().unwrap(), UiLang::Uk);
        assert_eq!(UiLang::Uk.to_string(), "uk");
        assert!("de".parse::<UiLang>().is_err());
    }

    #[test]
    fn localized_falls_back_to_english() {
        let text = Localized {
            en: "rule".into(),
            uk: None,
        };
        assert_eq!(text.get(UiLang::Uk), "rule");

        let both = Localized {
            en: "rule".into(),
            uk: Some("правило".into()),
        };
        assert_eq!(both.get(UiLang::Uk), "правило");
        assert_eq!(both.get(UiLang::En), "rule");
    }

    #[test]
    fn item_kind_accepts_legacy_alias() {
        let kind: ItemKind = serde_json::from_str("\"free_text\"").unwrap();
        assert_eq!(kind, ItemKind::Freetext);
        let kind: ItemKind = serde_json::from_str("\"freetext\"").unwrap();
        assert_eq!(kind, ItemKind::Freetext);
    }

    #[test]
    fn phase_labels() {
        assert_eq!(Phase::Placement.label(), "placement");
        let detour = Phase::Detour(DetourProgress {
            rule_key: "unit_1".into(),
            queue: vec![],
            pos: 0,
            regeneration: 1,
            resume: None,
        });
        assert_eq!(detour.label(), "detour");
    }

    #[test]
    fn outcome_flipped_counts_as_correct() {
        assert!(Outcome::FlippedCorrect.is_correct());
        assert!(!Outcome::Incorrect.is_correct());
        assert_eq!(Outcome::FlippedCorrect.as_str(), "flipped-correct");
    }

    #[test]
    fn session_touch_bumps_revision() {
        let now = Utc::now();
        let mut session = LearnerSession::new("learner-1", UiLang::Uk, now);
        assert_eq!(session.revision, 0);
        session.touch(now);
        session.touch(now);
        assert_eq!(session.revision, 2);
    }

    #[test]
    fn session_serde_roundtrip() {
        let now = Utc::now();
        let mut session = LearnerSession::new("learner-1", UiLang::En, now);
        session.phase = Phase::AwaitingRevisit(RevisitProgress {
            rule_key: "unit_3".into(),
            item_id: "unit_3-ex1-1".into(),
            resume: Box::new(Phase::Placement),
        });
        session.solved_items.insert("p1".into());

        let json = serde_json::to_string(&session).unwrap();
        let back: LearnerSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.learner_id, "learner-1");
        assert_eq!(back.phase.label(), "revisit");
        assert!(back.solved_items.contains("p1"));
    }

    #[test]
    fn revisit_kind_roundtrip() {
        assert_eq!(
            RevisitKind::ShortDelay.as_str().parse::<RevisitKind>().unwrap(),
            RevisitKind::ShortDelay
        );
        assert!("monthly".parse::<RevisitKind>().is_err());
    }
}
