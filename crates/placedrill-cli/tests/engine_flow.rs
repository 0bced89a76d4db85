//! End-to-end engine scenarios over the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use placedrill_collab::MockExplainer;
use placedrill_content::{dataset, ItemBank};
use placedrill_core::engine::Engine;
use placedrill_core::model::{Outcome, RevisitKind};
use placedrill_core::prompt::PromptKind;
use placedrill_core::traits::{Explainer, StateStore};
use placedrill_core::EngineConfig;
use placedrill_store::MemoryStore;

const LEARNER: &str = "learner-1";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

fn bank() -> Arc<ItemBank> {
    let placement: dataset::PlacementFile = serde_json::from_str(
        r#"{"items": [
            {"id": "p1", "rule_key": "unit_in", "kind": "freetext",
             "prompt": "The cat is ___ the box.", "canonical": "in",
             "accepted_variants": ["inside"]},
            {"id": "p2", "rule_key": "unit_ps", "kind": "mcq",
             "prompt": "She ___ to school every day.", "canonical": "goes",
             "options": ["go", "goes", "going", "gone"]}
        ]}"#,
    )
    .unwrap();
    let exercises: dataset::ExercisesFile = serde_json::from_str(
        r#"{"exercises": [
            {"rule_key": "unit_in", "items": [
                {"kind": "freetext", "prompt": "The book is ___ the bag.",
                 "canonical": "in"},
                {"kind": "freetext", "prompt": "The keys are ___ the drawer.",
                 "canonical": "in"}
            ]},
            {"rule_key": "unit_ps", "items": [
                {"kind": "mcq", "prompt": "He ___ coffee.", "canonical": "drinks",
                 "options": ["drink", "drinks", "drinking", "drank"]}
            ]}
        ]}"#,
    )
    .unwrap();
    let rules: dataset::RulesFile = serde_json::from_str(
        r#"{"rules": [
            {"rule_key": "unit_in",
             "explanation": {"en": "Use 'in' for containment.",
                             "uk": "Вживайте 'in' для вмісту."},
             "examples": ["The cat is in the box."]},
            {"rule_key": "unit_ps", "explanation": "Third person adds -s."}
        ]}"#,
    )
    .unwrap();
    Arc::new(
        ItemBank::from_parts(
            placement.into_items(),
            exercises.into_sets(),
            rules.into_rules(),
        )
        .unwrap(),
    )
}

fn engine_with(
    explainer: Option<Arc<dyn Explainer>>,
) -> (Engine, Arc<MemoryStore>, Arc<ItemBank>) {
    let bank = bank();
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(
        bank.clone(),
        store.clone(),
        explainer,
        EngineConfig::default(),
    );
    (engine, store, bank)
}

async fn onboard(engine: &Engine, now: DateTime<Utc>) {
    let reply = engine.handle_message(LEARNER, "hello", now).await.unwrap();
    assert_eq!(reply.kind, PromptKind::AskLanguage);
    let reply = engine.handle_message(LEARNER, "en", now).await.unwrap();
    assert_eq!(reply.kind, PromptKind::Question);
    assert!(reply.text.contains("The cat is ___ the box."));
}

#[tokio::test]
async fn onboarding_asks_language_then_serves_first_item() {
    let (engine, _, _) = engine_with(None);
    onboard(&engine, t0()).await;
}

#[tokio::test]
async fn unknown_language_reply_reprompts() {
    let (engine, _, _) = engine_with(None);
    engine.handle_message(LEARNER, "hello", t0()).await.unwrap();
    let reply = engine.handle_message(LEARNER, "klingon", t0()).await.unwrap();
    assert_eq!(reply.kind, PromptKind::AskLanguage);
}

#[tokio::test]
async fn correct_answer_advances_placement() {
    let (engine, store, _) = engine_with(None);
    onboard(&engine, t0()).await;

    let reply = engine.handle_message(LEARNER, "in", t0()).await.unwrap();
    assert!(reply.text.contains("Correct!"));
    assert!(reply.text.contains("She ___ to school every day."));
    assert!(reply.text.contains("B) goes"));

    let session = store.load_session(LEARNER).await.unwrap().unwrap();
    assert_eq!(session.placement_pos, 1);
    assert!(session.solved_items.contains("p1"));
}

#[tokio::test]
async fn accepted_variant_with_messy_input_counts() {
    let (engine, store, _) = engine_with(None);
    onboard(&engine, t0()).await;

    let reply = engine
        .handle_message(LEARNER, "  Inside! ", t0())
        .await
        .unwrap();
    assert!(reply.text.contains("Correct!"));

    let attempts = store.attempts_for(LEARNER).await.unwrap();
    assert_eq!(attempts.last().unwrap().outcome, Outcome::Correct);
    assert_eq!(attempts.last().unwrap().normalized_input, "inside");
}

#[tokio::test]
async fn mcq_accepts_option_letter() {
    let (engine, _, _) = engine_with(None);
    onboard(&engine, t0()).await;
    engine.handle_message(LEARNER, "in", t0()).await.unwrap();

    let reply = engine.handle_message(LEARNER, "B", t0()).await.unwrap();
    assert!(reply.text.contains("Correct!"));
}

#[tokio::test]
async fn wrong_answer_starts_detour_and_batch_completion_books_tickets() {
    let (engine, store, _) = engine_with(None);
    onboard(&engine, t0()).await;

    // Miss: canonical revealed, rule explained, first exercise served.
    let reply = engine.handle_message(LEARNER, "on", t0()).await.unwrap();
    assert!(reply.text.contains("Not quite. The correct answer: in"));
    assert!(reply.text.contains("Use 'in' for containment."));
    assert!(reply.text.contains("The book is ___ the bag."));

    // Work through the batch.
    let reply = engine.handle_message(LEARNER, "in", t0()).await.unwrap();
    assert!(reply.text.contains("The keys are ___ the drawer."));
    let reply = engine.handle_message(LEARNER, "in", t0()).await.unwrap();

    // Batch done: both rechecks booked, back to the missed item.
    assert!(reply.text.contains("The cat is ___ the box."));
    let pending = store.pending_tickets(LEARNER).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].due_at, t0() + Duration::days(2));
    assert_eq!(pending[1].due_at, t0() + Duration::days(7));

    // The retried item now sticks.
    let reply = engine.handle_message(LEARNER, "in", t0()).await.unwrap();
    assert!(reply.text.contains("She ___ to school every day."));
}

#[tokio::test]
async fn flip_accepts_near_miss_answer() {
    let mock = Arc::new(MockExplainer::with_fixed_flip(true));
    let (engine, store, _) = engine_with(Some(mock.clone()));
    onboard(&engine, t0()).await;

    let reply = engine.handle_message(LEARNER, "within", t0()).await.unwrap();
    assert!(reply.text.contains("Accepted"));
    assert!(reply.text.contains("She ___ to school every day."));
    assert_eq!(mock.call_count(), 1);

    let attempts = store.attempts_for(LEARNER).await.unwrap();
    assert_eq!(attempts.last().unwrap().outcome, Outcome::FlippedCorrect);
    assert!(attempts.last().unwrap().explanation.is_some());
}

#[tokio::test]
async fn flip_is_offered_once_per_item_and_answer() {
    // Declining mock: every miss is final, but each (item, answer) pair
    // may consult the collaborator at most once.
    let mock = Arc::new(MockExplainer::with_fixed_flip(false));
    let (engine, store, _) = engine_with(Some(mock.clone()));
    onboard(&engine, t0()).await;

    // Placement miss: first flip consultation.
    engine.handle_message(LEARNER, "on", t0()).await.unwrap();
    assert_eq!(mock.call_count(), 1);

    // Detour exercise miss: new item, second consultation; the batch
    // regenerates with the same leading exercise.
    let reply = engine.handle_message(LEARNER, "on", t0()).await.unwrap();
    assert_eq!(mock.call_count(), 2);
    assert!(reply.text.contains("The book is ___ the bag."));

    // Same item, same wrong answer: no further consultation, and the
    // exhausted budget escalates the rule.
    let reply = engine.handle_message(LEARNER, "on", t0()).await.unwrap();
    assert_eq!(mock.call_count(), 2);
    assert_eq!(reply.kind, PromptKind::Escalation);
    assert!(reply.text.contains("instructor"));
    // The missed placement item is skipped, not looped.
    assert!(reply.text.contains("She ___ to school every day."));

    let session = store.load_session(LEARNER).await.unwrap().unwrap();
    assert!(session.escalated_rules.contains("unit_in"));
    assert!(store.pending_tickets(LEARNER).await.unwrap().is_empty());
}

#[tokio::test]
async fn collaborator_failure_scores_as_incorrect() {
    let mock = Arc::new(MockExplainer::failing());
    let (engine, store, _) = engine_with(Some(mock.clone()));
    onboard(&engine, t0()).await;

    let reply = engine.handle_message(LEARNER, "within", t0()).await.unwrap();
    assert!(reply.text.contains("Not quite"));
    let attempts = store.attempts_for(LEARNER).await.unwrap();
    assert_eq!(attempts.last().unwrap().outcome, Outcome::Incorrect);
}

async fn complete_first_detour(engine: &Engine, now: DateTime<Utc>) {
    engine.handle_message(LEARNER, "on", now).await.unwrap();
    engine.handle_message(LEARNER, "in", now).await.unwrap();
    engine.handle_message(LEARNER, "in", now).await.unwrap();
}

#[tokio::test]
async fn short_delay_recheck_fires_and_resolves() {
    let (engine, store, _) = engine_with(None);
    onboard(&engine, t0()).await;
    complete_first_detour(&engine, t0()).await;

    // Nothing due yet.
    assert!(engine.poll_due(t0() + Duration::days(1)).await.unwrap().is_empty());

    let due_at = t0() + Duration::days(2) + Duration::hours(1);
    let deliveries = engine.poll_due(due_at).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].kind, RevisitKind::ShortDelay);
    assert!(deliveries[0].prompt.text.contains("recheck"));

    // Answering doubles as delivery confirmation and resolves the ticket.
    let reply = engine.handle_message(LEARNER, "in", due_at).await.unwrap();
    assert!(reply.text.contains("Correct!"));
    assert!(reply.text.contains("The cat is ___ the box."));

    let pending = store.pending_tickets(LEARNER).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, RevisitKind::WeekCheck);
}

#[tokio::test]
async fn missed_short_delay_recheck_rebooks_one_ticket() {
    let (engine, store, _) = engine_with(None);
    onboard(&engine, t0()).await;
    complete_first_detour(&engine, t0()).await;

    let due_at = t0() + Duration::days(2) + Duration::hours(1);
    engine.poll_due(due_at).await.unwrap();

    // Miss the recheck: a fresh batch begins and exactly one new
    // short-delay ticket is booked (coalesced).
    let reply = engine.handle_message(LEARNER, "on", due_at).await.unwrap();
    assert!(reply.text.contains("Use 'in' for containment."));

    let pending = store.pending_tickets(LEARNER).await.unwrap();
    let short: Vec<_> = pending
        .iter()
        .filter(|t| t.kind == RevisitKind::ShortDelay)
        .collect();
    assert_eq!(short.len(), 1);
    assert_eq!(short[0].due_at, due_at + Duration::days(2));
}

#[tokio::test]
async fn week_check_miss_records_standing_gap() {
    let (engine, store, _) = engine_with(None);
    onboard(&engine, t0()).await;
    complete_first_detour(&engine, t0()).await;

    // Resolve the short-delay recheck first.
    let short_at = t0() + Duration::days(2) + Duration::hours(1);
    engine.poll_due(short_at).await.unwrap();
    engine.handle_message(LEARNER, "in", short_at).await.unwrap();

    let week_at = t0() + Duration::days(7) + Duration::hours(1);
    let deliveries = engine.poll_due(week_at).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].kind, RevisitKind::WeekCheck);

    let reply = engine.handle_message(LEARNER, "on", week_at).await.unwrap();
    assert!(reply.text.contains("study plan"));

    let session = store.load_session(LEARNER).await.unwrap().unwrap();
    assert!(session.standing_gaps.contains("unit_in"));
    // Final signal: never re-drilled, nothing rebooked.
    assert!(store.pending_tickets(LEARNER).await.unwrap().is_empty());
}

#[tokio::test]
async fn due_recheck_preempts_next_placement_prompt() {
    let (engine, _, _) = engine_with(None);
    onboard(&engine, t0()).await;
    complete_first_detour(&engine, t0()).await;

    // Answer the retried item after the short-delay ticket came due:
    // the reply carries the recheck instead of the next placement item.
    let later = t0() + Duration::days(3);
    let reply = engine.handle_message(LEARNER, "in", later).await.unwrap();
    assert!(reply.text.contains("Correct!"));
    assert!(reply.text.contains("recheck"));
    assert!(!reply.text.contains("She ___ to school every day."));

    // Resolving the recheck resumes placement.
    let reply = engine.handle_message(LEARNER, "in", later).await.unwrap();
    assert!(reply.text.contains("She ___ to school every day."));
}

#[tokio::test]
async fn completion_waits_for_outstanding_rechecks() {
    let (engine, store, _) = engine_with(None);
    onboard(&engine, t0()).await;
    complete_first_detour(&engine, t0()).await;

    // Finish both placement items while rechecks are outstanding.
    engine.handle_message(LEARNER, "in", t0()).await.unwrap();
    let reply = engine.handle_message(LEARNER, "goes", t0()).await.unwrap();
    assert_eq!(reply.kind, PromptKind::Idle);
    assert!(reply.text.contains("rechecks"));

    let session = store.load_session(LEARNER).await.unwrap().unwrap();
    assert!(!session.archived);

    // Resolve both rechecks; the session then completes and archives.
    let short_at = t0() + Duration::days(2) + Duration::hours(1);
    engine.poll_due(short_at).await.unwrap();
    engine.handle_message(LEARNER, "in", short_at).await.unwrap();

    let week_at = t0() + Duration::days(7) + Duration::hours(1);
    engine.poll_due(week_at).await.unwrap();
    let reply = engine.handle_message(LEARNER, "in", week_at).await.unwrap();
    assert_eq!(reply.kind, PromptKind::Completed);

    let session = store.load_session(LEARNER).await.unwrap().unwrap();
    assert!(session.archived);
    assert_eq!(session.phase.label(), "completed");
}

#[tokio::test]
async fn completed_session_answers_with_closing_text() {
    let (engine, _, _) = engine_with(None);
    onboard(&engine, t0()).await;
    engine.handle_message(LEARNER, "in", t0()).await.unwrap();
    let reply = engine.handle_message(LEARNER, "goes", t0()).await.unwrap();
    assert_eq!(reply.kind, PromptKind::Completed);

    let reply = engine.handle_message(LEARNER, "hi again", t0()).await.unwrap();
    assert_eq!(reply.kind, PromptKind::Completed);
}

#[tokio::test]
async fn unacked_poll_delivery_resurfaces() {
    let (engine, store, _) = engine_with(None);
    onboard(&engine, t0()).await;
    complete_first_detour(&engine, t0()).await;

    let due_at = t0() + Duration::days(2) + Duration::hours(1);
    let first = engine.poll_due(due_at).await.unwrap();
    assert_eq!(first.len(), 1);

    // Ticket stays pending until acked, so an unconfirmed delivery is
    // surfaced again on the next poll, with the same prompt.
    let pending = store.pending_tickets(LEARNER).await.unwrap();
    assert!(pending
        .iter()
        .any(|t| t.kind == RevisitKind::ShortDelay));
    let second = engine.poll_due(due_at + Duration::minutes(5)).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].rule_key, "unit_in");
    assert_eq!(second[0].kind, RevisitKind::ShortDelay);
    assert_eq!(second[0].prompt.text, first[0].prompt.text);

    engine
        .ack_delivery(LEARNER, "unit_in", RevisitKind::ShortDelay)
        .await
        .unwrap();
    let pending = store.pending_tickets(LEARNER).await.unwrap();
    assert!(pending.iter().all(|t| t.kind != RevisitKind::ShortDelay));
    assert!(engine
        .poll_due(due_at + Duration::minutes(10))
        .await
        .unwrap()
        .is_empty());
}
