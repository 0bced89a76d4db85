//! Core engine for adaptive language placement with spaced rechecks.
//!
//! Everything here is transport-agnostic and clock-agnostic: callers
//! inject `now`, a [`traits::ContentStore`] for assessment content, a
//! [`traits::StateStore`] for persistence and an optional
//! [`traits::Explainer`] collaborator for verdict flips.

pub mod config;
pub mod detour;
pub mod engine;
pub mod error;
pub mod grader;
pub mod matcher;
pub mod model;
pub mod prompt;
pub mod scheduler;
pub mod traits;

pub use config::EngineConfig;
pub use engine::{DueDelivery, Engine};
pub use error::{EngineError, StoreError};
pub use model::{
    AssessmentItem, AttemptRecord, ItemKind, LearnerSession, Localized, Outcome, Phase,
    RevisitKind, RevisitTicket, RuleRemediation, TicketStatus, UiLang,
};
pub use prompt::{OutboundPrompt, PromptKind};
pub use traits::{ContentStore, ExplainRequest, ExplainResponse, Explainer, StateStore};
