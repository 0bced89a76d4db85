//! In-memory item bank implementing the engine's content-store seam.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use placedrill_core::model::{AssessmentItem, RuleRemediation};
use placedrill_core::traits::ContentStore;

use crate::dataset::{ExerciseRecord, ExercisesFile, ItemRecord, PlacementFile, RuleRecord, RulesFile};
use crate::error::ContentError;

/// Read-only content bank: placement order, rule remediations, item
/// lookup by id. Built once at startup, safely shared.
#[derive(Debug)]
pub struct ItemBank {
    placement: Vec<AssessmentItem>,
    remediations: HashMap<String, RuleRemediation>,
    by_id: HashMap<String, AssessmentItem>,
}

impl ItemBank {
    /// Load `placement.json`, `exercises.json` and `rules.json` from a
    /// content directory.
    pub fn load_dir(dir: &Path) -> Result<Self, ContentError> {
        let placement: PlacementFile = read_json(&dir.join("placement.json"))?;
        let exercises: ExercisesFile = read_json(&dir.join("exercises.json"))?;
        let rules: RulesFile = read_json(&dir.join("rules.json"))?;
        let bank = Self::from_parts(
            placement.into_items(),
            exercises.into_sets(),
            rules.into_rules(),
        )?;
        tracing::info!(
            placement_items = bank.placement.len(),
            rules = bank.remediations.len(),
            "content bank loaded"
        );
        Ok(bank)
    }

    /// Assemble a bank from already-parsed records.
    pub fn from_parts(
        placement: Vec<ItemRecord>,
        exercise_sets: Vec<ExerciseRecord>,
        rules: Vec<RuleRecord>,
    ) -> Result<Self, ContentError> {
        let mut by_id: HashMap<String, AssessmentItem> = HashMap::new();
        let mut placement_items = Vec::with_capacity(placement.len());

        for (pos, record) in placement.into_iter().enumerate() {
            let id = record
                .id
                .clone()
                .unwrap_or_else(|| format!("placement-{}", pos + 1));
            let item = build_item(record, &id, pos as u32 + 1);
            if by_id.insert(id.clone(), item.clone()).is_some() {
                return Err(ContentError::DuplicateItem(id));
            }
            placement_items.push(item);
        }

        let mut pools: HashMap<String, Vec<AssessmentItem>> = HashMap::new();
        for (set_pos, set) in exercise_sets.into_iter().enumerate() {
            for (item_pos, record) in set.items.into_iter().enumerate() {
                let id = record.id.clone().unwrap_or_else(|| {
                    format!("{}-ex{}-it{}", set.rule_key, set_pos + 1, item_pos + 1)
                });
                // Sequence keeps whole sets together, in file order.
                let sequence = record
                    .sequence
                    .unwrap_or((set_pos as u32 + 1) * 100 + item_pos as u32);
                let mut item = build_item(record, &id, sequence);
                item.rule_key = set.rule_key.clone();
                if by_id.insert(id.clone(), item.clone()).is_some() {
                    return Err(ContentError::DuplicateItem(id));
                }
                pools.entry(set.rule_key.clone()).or_default().push(item);
            }
        }

        let mut remediations = HashMap::new();
        for rule in rules {
            let key = rule.rule_key.clone();
            let exercises = pools.remove(&key).unwrap_or_default();
            let remediation = RuleRemediation {
                rule_key: key.clone(),
                title: rule.title,
                explanation: rule.explanation.into_localized(),
                short_explanation: rule.short_explanation.map(|s| s.into_localized()),
                examples: rule.examples,
                exercises,
            };
            if remediations.insert(key.clone(), remediation).is_some() {
                return Err(ContentError::DuplicateRule(key));
            }
        }
        for (orphan, _) in pools {
            tracing::warn!(rule_key = %orphan, "exercise set has no rule record");
        }

        Ok(Self {
            placement: placement_items,
            remediations,
            by_id,
        })
    }

    pub fn placement_items(&self) -> &[AssessmentItem] {
        &self.placement
    }

    pub fn remediations(&self) -> impl Iterator<Item = &RuleRemediation> {
        self.remediations.values()
    }

    pub fn rule(&self, rule_key: &str) -> Option<&RuleRemediation> {
        self.remediations.get(rule_key)
    }
}

fn build_item(record: ItemRecord, id: &str, default_sequence: u32) -> AssessmentItem {
    AssessmentItem {
        id: id.to_string(),
        rule_key: record.rule_key.unwrap_or_default(),
        kind: record.kind,
        instruction: record.instruction,
        prompt: record.prompt,
        canonical: record.canonical,
        accepted_variants: record.accepted_variants,
        options: record.options,
        sequence: record.sequence.unwrap_or(default_sequence),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ContentError> {
    let content = std::fs::read_to_string(path).map_err(|source| ContentError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ContentError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[async_trait]
impl ContentStore for ItemBank {
    async fn placement_item(&self, position: usize) -> anyhow::Result<Option<AssessmentItem>> {
        Ok(self.placement.get(position).cloned())
    }

    async fn placement_len(&self) -> anyhow::Result<usize> {
        Ok(self.placement.len())
    }

    async fn remediation(&self, rule_key: &str) -> anyhow::Result<Option<RuleRemediation>> {
        Ok(self.remediations.get(rule_key).cloned())
    }

    async fn item(&self, item_id: &str) -> anyhow::Result<Option<AssessmentItem>> {
        Ok(self.by_id.get(item_id).cloned())
    }
}
