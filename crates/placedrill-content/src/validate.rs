//! Dataset validation.
//!
//! Errors block an item from being served; warnings are operator hints.

use std::collections::HashSet;
use std::fmt;

use placedrill_core::matcher;
use placedrill_core::model::{AssessmentItem, ItemKind};

use crate::bank::ItemBank;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One finding from a validation run.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Item id or rule key the issue concerns.
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    fn error(location: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            location: location.to_string(),
            message: message.into(),
        }
    }

    fn warning(location: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            location: location.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a loaded bank. Returns all findings; the caller decides
/// whether errors are fatal.
pub fn validate_bank(bank: &ItemBank) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let rule_keys: HashSet<&str> = bank.remediations().map(|r| r.rule_key.as_str()).collect();

    for item in bank.placement_items() {
        validate_item(item, &mut issues);
        if item.rule_key.is_empty() {
            issues.push(ValidationIssue::error(&item.id, "placement item has no rule key"));
        } else if !rule_keys.contains(item.rule_key.as_str()) {
            issues.push(ValidationIssue::warning(
                &item.id,
                format!("no remediation content for rule '{}'", item.rule_key),
            ));
        }
    }

    for remediation in bank.remediations() {
        if remediation.exercises.is_empty() {
            issues.push(ValidationIssue::warning(
                &remediation.rule_key,
                "rule has no exercises; misses cannot be drilled",
            ));
        }
        if remediation.explanation.en.trim().is_empty() {
            issues.push(ValidationIssue::error(
                &remediation.rule_key,
                "rule explanation is empty",
            ));
        }
        let mut seen_sequences = HashSet::new();
        for exercise in &remediation.exercises {
            validate_item(exercise, &mut issues);
            if !seen_sequences.insert(exercise.sequence) {
                issues.push(ValidationIssue::warning(
                    &exercise.id,
                    format!("duplicate sequence {} within rule", exercise.sequence),
                ));
            }
        }
    }

    issues
}

fn validate_item(item: &AssessmentItem, issues: &mut Vec<ValidationIssue>) {
    if let Err(e) = matcher::check_item(item) {
        issues.push(ValidationIssue::error(&item.id, e.to_string()));
        return;
    }

    match item.kind {
        ItemKind::Mcq => {
            if item.options.len() != 4 {
                issues.push(ValidationIssue::error(
                    &item.id,
                    format!("mcq must have exactly 4 options, found {}", item.options.len()),
                ));
            }
            // The canonical must itself grade as correct.
            if !answer_matches(item, &item.canonical) {
                issues.push(ValidationIssue::error(
                    &item.id,
                    format!("canonical '{}' does not resolve to an option", item.canonical),
                ));
            }
        }
        ItemKind::Multiselect => {
            if !answer_matches(item, &item.canonical) {
                issues.push(ValidationIssue::error(
                    &item.id,
                    format!(
                        "canonical '{}' contains parts that are not options",
                        item.canonical
                    ),
                ));
            }
        }
        // Freetext needs only a non-empty canonical; check_item covers it.
        ItemKind::Freetext => {}
    }
}

fn answer_matches(item: &AssessmentItem, answer: &str) -> bool {
    matcher::match_answer(item, answer)
        .map(|outcome| outcome.matched)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ExercisesFile, PlacementFile, RulesFile};

    fn bank_from(placement: &str, exercises: &str, rules: &str) -> ItemBank {
        let placement: PlacementFile = serde_json::from_str(placement).unwrap();
        let exercises: ExercisesFile = serde_json::from_str(exercises).unwrap();
        let rules: RulesFile = serde_json::from_str(rules).unwrap();
        ItemBank::from_parts(
            placement.into_items(),
            exercises.into_sets(),
            rules.into_rules(),
        )
        .unwrap()
    }

    #[test]
    fn clean_dataset_passes() {
        let bank = bank_from(
            r#"{"items": [{"id": "p1", "rule_key": "unit_1", "kind": "mcq",
                "prompt": "She ___ home.", "canonical": "goes",
                "options": ["go", "goes", "going", "gone"]}]}"#,
            r#"{"exercises": [{"rule_key": "unit_1", "items": [
                {"kind": "freetext", "prompt": "He ___ early.", "canonical": "wakes"}
            ]}]}"#,
            r#"{"rules": [{"rule_key": "unit_1", "explanation": "Habits."}]}"#,
        );
        let issues = validate_bank(&bank);
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn mcq_option_count_is_enforced() {
        let bank = bank_from(
            r#"{"items": [{"id": "p1", "rule_key": "unit_1", "kind": "mcq",
                "prompt": "She ___ home.", "canonical": "goes",
                "options": ["go", "goes", "going"]}]}"#,
            r#"{"exercises": []}"#,
            r#"{"rules": [{"rule_key": "unit_1", "explanation": "Habits."}]}"#,
        );
        let issues = validate_bank(&bank);
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.message.contains("exactly 4")));
    }

    #[test]
    fn canonical_must_be_an_option() {
        let bank = bank_from(
            r#"{"items": [{"id": "p1", "rule_key": "unit_1", "kind": "mcq",
                "prompt": "She ___ home.", "canonical": "went",
                "options": ["go", "goes", "going", "gone"]}]}"#,
            r#"{"exercises": []}"#,
            r#"{"rules": [{"rule_key": "unit_1", "explanation": "Habits."}]}"#,
        );
        let issues = validate_bank(&bank);
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.message.contains("does not resolve")));
    }

    #[test]
    fn multiselect_canonical_parts_checked() {
        let bank = bank_from(
            r#"{"items": [{"id": "p1", "rule_key": "unit_1", "kind": "multiselect",
                "prompt": "Pick stative verbs.", "canonical": "know,swim",
                "options": ["know", "run", "believe", "jump"]}]}"#,
            r#"{"exercises": []}"#,
            r#"{"rules": [{"rule_key": "unit_1", "explanation": "Statives."}]}"#,
        );
        let issues = validate_bank(&bank);
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.location == "p1"));
    }

    #[test]
    fn missing_remediation_is_a_warning() {
        let bank = bank_from(
            r#"{"items": [{"id": "p1", "rule_key": "unit_9", "kind": "freetext",
                "prompt": "The cat is ___ the box.", "canonical": "in"}]}"#,
            r#"{"exercises": []}"#,
            r#"{"rules": []}"#,
        );
        let issues = validate_bank(&bank);
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Warning && i.message.contains("unit_9")));
    }
}
