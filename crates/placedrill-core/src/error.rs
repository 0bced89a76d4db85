//! Engine and persistence error types.
//!
//! Defined in `placedrill-core` so callers can classify failures without
//! string matching: configuration errors go to operators, persistence
//! failures are retryable turn errors, collaborator failures are handled
//! inside scoring and never surface here.

use thiserror::Error;

use crate::matcher::MatchError;

/// Errors from a state-store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A persisted record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by the session state machine for one turn.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed content reached the answer path. Operator-facing; the
    /// serving path validates items so this indicates a content defect.
    #[error("item configuration error: {0}")]
    ItemConfig(#[from] MatchError),

    /// A content-store lookup failed.
    #[error("content store error: {0}")]
    Content(String),

    /// Content the session references no longer exists.
    #[error("missing content: {0}")]
    MissingContent(String),

    /// A state write failed after the retry; the learner should resend
    /// the message, nothing was acknowledged.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl EngineError {
    /// Whether the learner can simply retry the turn.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Persistence(_) | EngineError::Content(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_is_retryable() {
        let err = EngineError::Persistence(StoreError::Backend("disk full".into()));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn item_config_is_not_retryable() {
        let err = EngineError::ItemConfig(MatchError::MissingOptions("q1".into()));
        assert!(!err.is_retryable());
    }
}
