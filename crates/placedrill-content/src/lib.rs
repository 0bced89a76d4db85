//! placedrill-content: content datasets, item bank, validation.

pub mod bank;
pub mod dataset;
pub mod error;
pub mod validate;

pub use bank::ItemBank;
pub use error::ContentError;
pub use validate::{validate_bank, Severity, ValidationIssue};
