//! In-memory state store for tests and the simulator.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use placedrill_core::error::StoreError;
use placedrill_core::model::{
    AttemptRecord, DetourBudget, LearnerSession, RevisitKind, RevisitTicket, TicketStatus,
};
use placedrill_core::traits::StateStore;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, LearnerSession>,
    attempts: Vec<AttemptRecord>,
    tickets: Vec<RevisitTicket>,
    budgets: HashMap<(String, String), DetourBudget>,
}

/// `StateStore` kept entirely in memory. Upholds the same ticket
/// coalescing invariant as the SQLite backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All attempts across learners, for simulator reporting.
    pub fn all_attempts(&self) -> Vec<AttemptRecord> {
        self.inner().attempts.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_session(
        &self,
        learner_id: &str,
    ) -> Result<Option<LearnerSession>, StoreError> {
        Ok(self.inner().sessions.get(learner_id).cloned())
    }

    async fn save_session(&self, session: &LearnerSession) -> Result<(), StoreError> {
        self.inner()
            .sessions
            .insert(session.learner_id.clone(), session.clone());
        Ok(())
    }

    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<(), StoreError> {
        self.inner().attempts.push(attempt.clone());
        Ok(())
    }

    async fn attempts_for(&self, learner_id: &str) -> Result<Vec<AttemptRecord>, StoreError> {
        Ok(self
            .inner()
            .attempts
            .iter()
            .filter(|a| a.learner_id == learner_id)
            .cloned()
            .collect())
    }

    async fn upsert_ticket(&self, ticket: &RevisitTicket) -> Result<(), StoreError> {
        let mut inner = self.inner();
        let existing = inner.tickets.iter_mut().find(|t| {
            t.status == TicketStatus::Pending
                && t.learner_id == ticket.learner_id
                && t.rule_key == ticket.rule_key
                && t.kind == ticket.kind
        });
        match existing {
            Some(pending) => pending.due_at = ticket.due_at,
            None => inner.tickets.push(ticket.clone()),
        }
        Ok(())
    }

    async fn pending_tickets(
        &self,
        learner_id: &str,
    ) -> Result<Vec<RevisitTicket>, StoreError> {
        let mut tickets: Vec<_> = self
            .inner()
            .tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Pending && t.learner_id == learner_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.due_at);
        Ok(tickets)
    }

    async fn due_tickets(&self, now: DateTime<Utc>) -> Result<Vec<RevisitTicket>, StoreError> {
        let mut tickets: Vec<_> = self
            .inner()
            .tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Pending && t.due_at <= now)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.due_at);
        Ok(tickets)
    }

    async fn mark_fired(
        &self,
        learner_id: &str,
        rule_key: &str,
        kind: RevisitKind,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner();
        for ticket in inner.tickets.iter_mut().filter(|t| {
            t.status == TicketStatus::Pending
                && t.learner_id == learner_id
                && t.rule_key == rule_key
                && t.kind == kind
        }) {
            ticket.status = TicketStatus::Fired;
        }
        Ok(())
    }

    async fn cancel_ticket(
        &self,
        learner_id: &str,
        rule_key: &str,
        kind: RevisitKind,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner();
        for ticket in inner.tickets.iter_mut().filter(|t| {
            t.status == TicketStatus::Pending
                && t.learner_id == learner_id
                && t.rule_key == rule_key
                && t.kind == kind
        }) {
            ticket.status = TicketStatus::Cancelled;
        }
        Ok(())
    }

    async fn load_budget(
        &self,
        learner_id: &str,
        rule_key: &str,
    ) -> Result<DetourBudget, StoreError> {
        Ok(self
            .inner()
            .budgets
            .get(&(learner_id.to_string(), rule_key.to_string()))
            .cloned()
            .unwrap_or_else(|| DetourBudget::new(learner_id, rule_key)))
    }

    async fn save_budget(&self, budget: &DetourBudget) -> Result<(), StoreError> {
        self.inner().budgets.insert(
            (budget.learner_id.clone(), budget.rule_key.clone()),
            budget.clone(),
        );
        Ok(())
    }
}
