//! Detour selection: remediation batches bounded by a per-rule budget.

use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::matcher;
use crate::model::{DetourBudget, RemediationBatch, RuleRemediation, UiLang};

/// Outcome of a remediation request.
#[derive(Debug, Clone)]
pub enum DetourOutcome {
    Batch(RemediationBatch),
    /// Budget exhausted; surface "seek instructor" instead of looping.
    Escalate,
}

/// Pick remediation content for a (learner, rule), or escalate.
///
/// Exercise order is deterministic by the content `sequence` field, so
/// repeated runs for the same learner are reproducible. Exercises the
/// learner already answered correctly are excluded, as are exercises
/// with malformed configuration.
pub fn select_remediation(
    budget: &mut DetourBudget,
    remediation: &RuleRemediation,
    solved_items: &BTreeSet<String>,
    lang: UiLang,
    config: &EngineConfig,
) -> DetourOutcome {
    if budget.regenerations_used >= config.max_regenerations {
        tracing::info!(
            learner_id = %budget.learner_id,
            rule_key = %budget.rule_key,
            regenerations = budget.regenerations_used,
            "detour budget exhausted, escalating"
        );
        return DetourOutcome::Escalate;
    }

    let servable: Vec<_> = remediation
        .exercises
        .iter()
        .filter(|item| match matcher::check_item(item) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(item_id = %item.id, error = %e, "skipping malformed exercise");
                false
            }
        })
        .cloned()
        .collect();
    let mut pool: Vec<_> = servable
        .iter()
        .filter(|item| !solved_items.contains(&item.id))
        .cloned()
        .collect();
    // A recheck miss can arrive with every exercise already solved;
    // re-drill the full pool rather than serving an empty batch.
    if pool.is_empty() {
        pool = servable;
    }
    pool.sort_by_key(|item| item.sequence);
    pool.truncate(config.batch_max);

    budget.regenerations_used += 1;
    budget.last_batch_size = pool.len() as u32;

    DetourOutcome::Batch(RemediationBatch {
        rule_key: remediation.rule_key.clone(),
        explanation: remediation.explanation.get(lang).to_string(),
        examples: remediation.examples.clone(),
        exercises: pool,
        regeneration: budget.regenerations_used,
    })
}
