//! Content errors.

use thiserror::Error;

/// Errors raised while importing a content directory.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate item id: {0}")]
    DuplicateItem(String),

    #[error("duplicate rule key: {0}")]
    DuplicateRule(String),
}
