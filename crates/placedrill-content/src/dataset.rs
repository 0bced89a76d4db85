//! Serde records for the content import format.
//!
//! Three files make up a content directory:
//! - `placement.json`: ordered placement items
//! - `exercises.json`: per-rule exercise sets for remediation
//! - `rules.json`: rule explanations and examples
//!
//! The importer accepts the legacy shapes the original datasets used:
//! bare top-level arrays as well as wrapped objects, `free_text` for the
//! item kind, and bare strings for localized texts.

use serde::Deserialize;

use placedrill_core::model::{ItemKind, Localized};

/// One item record; ids may be omitted inside exercise sets (they are
/// derived from the set position).
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "unit")]
    pub rule_key: Option<String>,
    pub kind: ItemKind,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(alias = "question")]
    pub prompt: String,
    #[serde(alias = "answer")]
    pub canonical: String,
    #[serde(default)]
    pub accepted_variants: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, alias = "order")]
    pub sequence: Option<u32>,
}

/// `placement.json`: `{"items": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PlacementFile {
    Wrapped { items: Vec<ItemRecord> },
    Bare(Vec<ItemRecord>),
}

impl PlacementFile {
    pub fn into_items(self) -> Vec<ItemRecord> {
        match self {
            PlacementFile::Wrapped { items } => items,
            PlacementFile::Bare(items) => items,
        }
    }
}

/// One exercise set: a group of items practicing a single rule.
#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseRecord {
    #[serde(alias = "unit")]
    pub rule_key: String,
    pub items: Vec<ItemRecord>,
}

/// `exercises.json`: `{"exercises": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExercisesFile {
    Wrapped { exercises: Vec<ExerciseRecord> },
    Bare(Vec<ExerciseRecord>),
}

impl ExercisesFile {
    pub fn into_sets(self) -> Vec<ExerciseRecord> {
        match self {
            ExercisesFile::Wrapped { exercises } => exercises,
            ExercisesFile::Bare(exercises) => exercises,
        }
    }
}

/// A localized text: either a bare English string or an en/uk pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LocalizedSpec {
    Text(String),
    Full(Localized),
}

impl LocalizedSpec {
    pub fn into_localized(self) -> Localized {
        match self {
            LocalizedSpec::Text(text) => Localized::en(&text),
            LocalizedSpec::Full(localized) => localized,
        }
    }
}

/// One rule's remediation texts.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleRecord {
    #[serde(alias = "unit")]
    pub rule_key: String,
    #[serde(default)]
    pub title: Option<String>,
    pub explanation: LocalizedSpec,
    #[serde(default)]
    pub short_explanation: Option<LocalizedSpec>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// `rules.json`: `{"rules": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RulesFile {
    Wrapped { rules: Vec<RuleRecord> },
    Bare(Vec<RuleRecord>),
}

impl RulesFile {
    pub fn into_rules(self) -> Vec<RuleRecord> {
        match self {
            RulesFile::Wrapped { rules } => rules,
            RulesFile::Bare(rules) => rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placedrill_core::model::UiLang;

    #[test]
    fn placement_accepts_both_shapes() {
        let wrapped: PlacementFile = serde_json::from_str(
            r#"{"items": [{"id": "p1", "rule_key": "unit_1", "kind": "freetext",
                "prompt": "The cat is ___ the box.", "canonical": "in"}]}"#,
        )
        .unwrap();
        assert_eq!(wrapped.into_items().len(), 1);

        let bare: PlacementFile = serde_json::from_str(
            r#"[{"id": "p1", "unit": "unit_1", "kind": "free_text",
                "question": "The cat is ___ the box.", "answer": "in"}]"#,
        )
        .unwrap();
        let items = bare.into_items();
        assert_eq!(items[0].rule_key.as_deref(), Some("unit_1"));
        assert_eq!(items[0].kind, ItemKind::Freetext);
        assert_eq!(items[0].canonical, "in");
    }

    #[test]
    fn rule_explanation_accepts_bare_string() {
        let rules: RulesFile = serde_json::from_str(
            r#"{"rules": [
                {"rule_key": "unit_1", "explanation": "Use 'in' for containment."},
                {"rule_key": "unit_2",
                 "explanation": {"en": "Habits.", "uk": "Звички."},
                 "examples": ["She walks."]}
            ]}"#,
        )
        .unwrap();
        let rules = rules.into_rules();
        let first = rules[0].explanation.clone().into_localized();
        assert_eq!(first.get(UiLang::Uk), "Use 'in' for containment.");
        let second = rules[1].explanation.clone().into_localized();
        assert_eq!(second.get(UiLang::Uk), "Звички.");
    }

    #[test]
    fn exercise_items_may_omit_ids() {
        let file: ExercisesFile = serde_json::from_str(
            r#"{"exercises": [{"rule_key": "unit_1", "items": [
                {"kind": "mcq", "prompt": "She ___ home.", "canonical": "goes",
                 "options": ["go", "goes", "going", "gone"]}
            ]}]}"#,
        )
        .unwrap();
        let sets = file.into_sets();
        assert!(sets[0].items[0].id.is_none());
        assert_eq!(sets[0].items[0].options.len(), 4);
    }
}
