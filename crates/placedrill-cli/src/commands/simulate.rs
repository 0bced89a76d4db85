//! The `placedrill simulate` command: scripted learner autoplay.
//!
//! Drives a whole assessment against an in-memory store with a solver
//! that answers canonically, misses at a configured rate, and jumps the
//! clock forward whenever the engine is waiting on a recheck. Fixed
//! seeds reproduce the same transcript.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use placedrill_content::ItemBank;
use placedrill_core::engine::Engine;
use placedrill_core::model::{AssessmentItem, Outcome, Phase};
use placedrill_core::prompt::PromptKind;
use placedrill_core::traits::{ContentStore, StateStore};
use placedrill_core::EngineConfig;
use placedrill_store::MemoryStore;

const LEARNER: &str = "sim-learner";

pub async fn execute(
    content: PathBuf,
    error_rate: f64,
    seed: u64,
    max_turns: usize,
    lang: String,
) -> Result<()> {
    let bank = Arc::new(
        ItemBank::load_dir(&content)
            .with_context(|| format!("failed to load content from {}", content.display()))?,
    );
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(bank.clone(), store.clone(), None, EngineConfig::default());

    let mut rng = StdRng::seed_from_u64(seed);
    let mut now: DateTime<Utc> = Utc::now();

    println!("simulate: error_rate={error_rate} seed={seed}");
    let reply = engine.handle_message(LEARNER, "hi", now).await?;
    transcript("hi", &reply.text);
    let reply = engine.handle_message(LEARNER, &lang, now).await?;
    transcript(&lang, &reply.text);

    for _turn in 0..max_turns {
        now += Duration::minutes(1);
        let Some(session) = store.load_session(LEARNER).await? else {
            break;
        };
        if matches!(session.phase, Phase::Completed) {
            break;
        }

        match pending_item(&session.phase, session.placement_pos, bank.as_ref()).await? {
            Some(item) => {
                let miss = rng.gen::<f64>() < error_rate;
                let answer = if miss {
                    "xyzzy".to_string()
                } else {
                    item.canonical.clone()
                };
                let reply = engine.handle_message(LEARNER, &answer, now).await?;
                transcript(&answer, &reply.text);
                if reply.kind == PromptKind::Completed {
                    break;
                }
            }
            None => {
                // Placement exhausted; jump the clock until a recheck
                // fires, then let the next pass answer it.
                now += Duration::days(3);
                let mut deliveries = engine.poll_due(now).await?;
                if deliveries.is_empty() {
                    now += Duration::days(5);
                    deliveries = engine.poll_due(now).await?;
                }
                if deliveries.is_empty() {
                    let reply = engine.handle_message(LEARNER, "status", now).await?;
                    transcript("status", &reply.text);
                    if reply.kind == PromptKind::Completed {
                        break;
                    }
                } else {
                    for delivery in deliveries {
                        transcript("(recheck due)", &delivery.prompt.text);
                        engine
                            .ack_delivery(&delivery.learner_id, &delivery.rule_key, delivery.kind)
                            .await?;
                    }
                }
            }
        }
    }

    print_summary(&store).await?;
    Ok(())
}

/// Resolve the item the engine is waiting on, if any.
async fn pending_item(
    phase: &Phase,
    placement_pos: usize,
    bank: &ItemBank,
) -> Result<Option<AssessmentItem>> {
    let item = match phase {
        Phase::Placement => bank.placement_item(placement_pos).await?,
        Phase::Detour(progress) => match progress.queue.get(progress.pos) {
            Some(id) => bank.item(id).await?,
            None => None,
        },
        Phase::AwaitingRevisit(progress) | Phase::WeeklyCheck(progress) => {
            bank.item(&progress.item_id).await?
        }
        _ => None,
    };
    Ok(item)
}

fn transcript(input: &str, reply: &str) {
    println!("\n<- {input}");
    for line in reply.lines() {
        println!("-> {line}");
    }
}

async fn print_summary(store: &MemoryStore) -> Result<()> {
    let attempts = store.all_attempts();
    let correct = attempts.iter().filter(|a| a.outcome.is_correct()).count();
    let flipped = attempts
        .iter()
        .filter(|a| a.outcome == Outcome::FlippedCorrect)
        .count();
    let session = store.load_session(LEARNER).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["metric", "value"]);
    table.add_row(vec![
        Cell::new("attempts"),
        Cell::new(attempts.len().to_string()),
    ]);
    table.add_row(vec![Cell::new("correct"), Cell::new(correct.to_string())]);
    table.add_row(vec![Cell::new("flipped"), Cell::new(flipped.to_string())]);
    if let Some(session) = session {
        table.add_row(vec![
            Cell::new("final phase"),
            Cell::new(session.phase.label()),
        ]);
        table.add_row(vec![
            Cell::new("escalated rules"),
            Cell::new(session.escalated_rules.len().to_string()),
        ]);
        table.add_row(vec![
            Cell::new("standing gaps"),
            Cell::new(session.standing_gaps.len().to_string()),
        ]);
    }
    println!("\n{table}");
    Ok(())
}
