//! placedrill-collab: explanation collaborator integrations.
//!
//! Implements the `Explainer` trait for Gemini plus a deterministic
//! mock, and holds the application-level configuration.

pub mod config;
pub mod error;
pub mod gemini;
pub mod mock;

pub use config::{
    create_explainer, load_config, load_config_from, ExplainerConfig, PlacedrillConfig,
};
pub use error::CollabError;
pub use gemini::GeminiExplainer;
pub use mock::MockExplainer;
