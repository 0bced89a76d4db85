//! Answer normalization and matching.
//!
//! Compares a learner's raw response against an item's canonical answer
//! and accepted variants. Matching never panics on malformed content;
//! missing option lists surface as a `MatchError` for the operator, not
//! as a learner-facing wrong answer.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::model::{AssessmentItem, ItemKind};

/// Malformed item data detected at match or serve time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("item '{0}' requires an option list but has none")]
    MissingOptions(String),

    #[error("item '{0}' has an empty canonical answer")]
    EmptyCanonical(String),
}

/// Result of matching one raw input against one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched: bool,
    /// The input after normalization (and option resolution for choice
    /// items); stored in the attempt record and fed to the collaborator.
    pub normalized: String,
}

/// Normalize free text for comparison: trim, lowercase, collapse internal
/// whitespace, strip terminal punctuation.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            for low in ch.to_lowercase() {
                out.push(low);
            }
            last_space = false;
        }
    }
    while out.ends_with(['.', '!', '?', ',']) {
        out.pop();
        while out.ends_with(' ') {
            out.pop();
        }
    }
    out
}

/// Split a multiselect submission into tokens. Semicolons and newlines
/// act as separators alongside commas.
pub fn split_tokens(s: &str) -> Vec<String> {
    s.split([',', ';', '\n'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve learner input to an option: a letter (A..), a 1-based number,
/// or the option text itself.
fn resolve_option<'a>(input: &str, options: &'a [String]) -> Option<&'a str> {
    let cleaned = input.trim();
    if cleaned.is_empty() {
        return None;
    }

    if cleaned.len() == 1 {
        let ch = cleaned.chars().next().unwrap().to_ascii_uppercase();
        if ch.is_ascii_alphabetic() {
            let idx = (ch as u8 - b'A') as usize;
            if idx < options.len() {
                return Some(&options[idx]);
            }
        }
    }

    if cleaned.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(idx) = cleaned.parse::<usize>() {
            if (1..=options.len()).contains(&idx) {
                return Some(&options[idx - 1]);
            }
        }
    }

    let key = normalize(cleaned);
    options.iter().find(|opt| normalize(opt) == key).map(|s| s.as_str())
}

/// Canonical plus accepted variants, normalized, empty entries dropped.
fn targets(item: &AssessmentItem) -> Vec<String> {
    std::iter::once(item.canonical.as_str())
        .chain(item.accepted_variants.iter().map(String::as_str))
        .map(normalize)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Match a raw learner response against an item.
pub fn match_answer(item: &AssessmentItem, raw: &str) -> Result<MatchOutcome, MatchError> {
    match item.kind {
        ItemKind::Mcq => match_choice(item, raw),
        ItemKind::Multiselect => match_multiselect(item, raw),
        ItemKind::Freetext => match_freetext(item, raw),
    }
}

/// Validate an item's configuration before serving it to a learner.
pub fn check_item(item: &AssessmentItem) -> Result<(), MatchError> {
    if matches!(item.kind, ItemKind::Mcq | ItemKind::Multiselect) && item.options.is_empty() {
        return Err(MatchError::MissingOptions(item.id.clone()));
    }
    if normalize(&item.canonical).is_empty() {
        return Err(MatchError::EmptyCanonical(item.id.clone()));
    }
    Ok(())
}

fn match_choice(item: &AssessmentItem, raw: &str) -> Result<MatchOutcome, MatchError> {
    if item.options.is_empty() {
        return Err(MatchError::MissingOptions(item.id.clone()));
    }
    let resolved = resolve_option(raw, &item.options).unwrap_or(raw);
    let normalized = normalize(resolved);
    let matched = !normalized.is_empty() && targets(item).contains(&normalized);
    Ok(MatchOutcome { matched, normalized })
}

fn match_multiselect(item: &AssessmentItem, raw: &str) -> Result<MatchOutcome, MatchError> {
    if item.options.is_empty() {
        return Err(MatchError::MissingOptions(item.id.clone()));
    }

    // Map each token to an option; unknown tokens stay unmapped and make
    // the selection fail the set comparison.
    let mut selected: Vec<String> = Vec::new();
    let mut unknown = false;
    for token in split_tokens(raw) {
        match resolve_option(&token, &item.options) {
            Some(opt) => {
                let norm = normalize(opt);
                if !selected.contains(&norm) {
                    selected.push(norm);
                }
            }
            None => unknown = true,
        }
    }

    let normalized = selected.join(", ");
    if selected.is_empty() {
        return Ok(MatchOutcome {
            matched: false,
            normalized,
        });
    }

    // Canonical is the separator-joined correct subset; its order is a
    // display contract, so the comparison is set equality.
    let canonical_set: BTreeSet<String> = item
        .canonical
        .split(',')
        .map(normalize)
        .filter(|p| !p.is_empty())
        .collect();
    let selected_set: BTreeSet<String> = selected.iter().cloned().collect();

    Ok(MatchOutcome {
        matched: !unknown && !canonical_set.is_empty() && selected_set == canonical_set,
        normalized,
    })
}

fn match_freetext(item: &AssessmentItem, raw: &str) -> Result<MatchOutcome, MatchError> {
    let normalized = normalize(raw);
    if normalize(&item.canonical).is_empty() {
        return Err(MatchError::EmptyCanonical(item.id.clone()));
    }
    let matched = !normalized.is_empty() && targets(item).contains(&normalized);
    Ok(MatchOutcome { matched, normalized })
}
