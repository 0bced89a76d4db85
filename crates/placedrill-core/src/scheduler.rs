//! Revisit scheduling: due-timestamp bookkeeping for delayed rechecks.
//!
//! Tickets are pure due-at comparisons against a supplied clock; nothing
//! here reads the wall clock, so the schedule is testable without real
//! time. Ticket writes go through `StateStore::upsert_ticket`, which
//! coalesces onto an existing pending ticket per (learner, rule, kind).

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::model::{RevisitKind, RevisitTicket};
use crate::traits::StateStore;

/// Build the pending ticket for one recheck kind.
pub fn ticket_for(
    learner_id: &str,
    rule_key: &str,
    kind: RevisitKind,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> RevisitTicket {
    let delay = match kind {
        RevisitKind::ShortDelay => config.short_delay(),
        RevisitKind::WeekCheck => config.week_delay(),
    };
    RevisitTicket::pending(learner_id, rule_key, kind, now + delay)
}

/// Within-learner FIFO: order tickets by due-at, short-delay first on ties.
pub fn order_due(mut tickets: Vec<RevisitTicket>) -> Vec<RevisitTicket> {
    tickets.sort_by(|a, b| {
        a.due_at
            .cmp(&b.due_at)
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
    });
    tickets
}

/// Book both rechecks after a completed remediation batch: one
/// short-delay and one week-check ticket, both pending.
pub async fn schedule_after_batch(
    store: &dyn StateStore,
    learner_id: &str,
    rule_key: &str,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<(), StoreError> {
    for kind in [RevisitKind::ShortDelay, RevisitKind::WeekCheck] {
        let ticket = ticket_for(learner_id, rule_key, kind, now, config);
        store.upsert_ticket(&ticket).await?;
        tracing::info!(
            learner_id,
            rule_key,
            kind = kind.as_str(),
            due_at = %ticket.due_at,
            "revisit ticket booked"
        );
    }
    Ok(())
}

/// Book exactly one fresh short-delay ticket after a missed recheck.
/// Coalescing keeps compounding failure from growing the ticket set.
pub async fn reschedule_short_delay(
    store: &dyn StateStore,
    learner_id: &str,
    rule_key: &str,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<(), StoreError> {
    let ticket = ticket_for(learner_id, rule_key, RevisitKind::ShortDelay, now, config);
    store.upsert_ticket(&ticket).await?;
    tracing::info!(
        learner_id,
        rule_key,
        due_at = %ticket.due_at,
        "short-delay recheck rescheduled after miss"
    );
    Ok(())
}

/// The earliest due pending ticket for one learner, if any.
pub async fn next_due_for(
    store: &dyn StateStore,
    learner_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<RevisitTicket>, StoreError> {
    let pending = store.pending_tickets(learner_id).await?;
    let due: Vec<_> = pending.into_iter().filter(|t| t.due_at <= now).collect();
    Ok(order_due(due).into_iter().next())
}
