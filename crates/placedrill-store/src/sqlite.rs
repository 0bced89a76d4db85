//! SQLite-backed state store.
//!
//! Sessions are stored as JSON bodies keyed by learner id; attempts are
//! an append-only table; tickets carry a partial unique index so the
//! database itself enforces at most one pending ticket per
//! (learner, rule, kind).

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use placedrill_core::error::StoreError;
use placedrill_core::model::{
    AttemptRecord, DetourBudget, LearnerSession, Outcome, RevisitKind, RevisitTicket, TicketStatus,
};
use placedrill_core::traits::StateStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    learner_id  TEXT PRIMARY KEY,
    body        TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attempts (
    id               TEXT PRIMARY KEY,
    learner_id       TEXT NOT NULL,
    item_id          TEXT NOT NULL,
    rule_key         TEXT NOT NULL,
    phase            TEXT NOT NULL,
    raw_input        TEXT NOT NULL,
    normalized_input TEXT NOT NULL,
    outcome          TEXT NOT NULL,
    explanation      TEXT,
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attempts_learner ON attempts(learner_id, created_at);

CREATE TABLE IF NOT EXISTS tickets (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    learner_id  TEXT NOT NULL,
    rule_key    TEXT NOT NULL,
    kind        TEXT NOT NULL,
    due_at      TEXT NOT NULL,
    status      TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_ticket_pending
    ON tickets(learner_id, rule_key, kind) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS budgets (
    learner_id         TEXT NOT NULL,
    rule_key           TEXT NOT NULL,
    regenerations_used INTEGER NOT NULL,
    last_batch_size    INTEGER NOT NULL,
    PRIMARY KEY (learner_id, rule_key)
);
";

/// `StateStore` backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        tracing::debug!(path = %path.display(), "opened sqlite state store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(backend)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(backend)?;
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means a prior panic mid-statement; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<RevisitTicket> {
    let kind_str: String = row.get("kind")?;
    let status_str: String = row.get("status")?;
    let kind = RevisitKind::from_str(&kind_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })?;
    let status = match status_str.as_str() {
        "pending" => TicketStatus::Pending,
        "fired" => TicketStatus::Fired,
        _ => TicketStatus::Cancelled,
    };
    Ok(RevisitTicket {
        learner_id: row.get("learner_id")?,
        rule_key: row.get("rule_key")?,
        kind,
        due_at: row.get("due_at")?,
        status,
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<AttemptRecord> {
    let id: String = row.get("id")?;
    let outcome_str: String = row.get("outcome")?;
    let outcome = match outcome_str.as_str() {
        "correct" => Outcome::Correct,
        "flipped-correct" => Outcome::FlippedCorrect,
        _ => Outcome::Incorrect,
    };
    Ok(AttemptRecord {
        id: id.parse().map_err(|e: uuid::Error| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        learner_id: row.get("learner_id")?,
        item_id: row.get("item_id")?,
        rule_key: row.get("rule_key")?,
        phase: row.get("phase")?,
        raw_input: row.get("raw_input")?,
        normalized_input: row.get("normalized_input")?,
        outcome,
        explanation: row.get("explanation")?,
        created_at: row.get("created_at")?,
    })
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load_session(
        &self,
        learner_id: &str,
    ) -> Result<Option<LearnerSession>, StoreError> {
        let conn = self.conn();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM sessions WHERE learner_id = ?1",
                params![learner_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        match body {
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn save_session(&self, session: &LearnerSession) -> Result<(), StoreError> {
        let body = serde_json::to_string(session)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO sessions (learner_id, body, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(learner_id) DO UPDATE SET body = excluded.body,
                     updated_at = excluded.updated_at",
                params![session.learner_id, body, session.updated_at],
            )
            .map_err(backend)?;
        Ok(())
    }

    async fn append_attempt(&self, attempt: &AttemptRecord) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO attempts (id, learner_id, item_id, rule_key, phase, raw_input,
                     normalized_input, outcome, explanation, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    attempt.id.to_string(),
                    attempt.learner_id,
                    attempt.item_id,
                    attempt.rule_key,
                    attempt.phase,
                    attempt.raw_input,
                    attempt.normalized_input,
                    attempt.outcome.as_str(),
                    attempt.explanation,
                    attempt.created_at,
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    async fn attempts_for(&self, learner_id: &str) -> Result<Vec<AttemptRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM attempts WHERE learner_id = ?1 ORDER BY created_at ASC, id ASC",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![learner_id], attempt_from_row)
            .map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
    }

    async fn upsert_ticket(&self, ticket: &RevisitTicket) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO tickets (learner_id, rule_key, kind, due_at, status)
                 VALUES (?1, ?2, ?3, ?4, 'pending')
                 ON CONFLICT(learner_id, rule_key, kind) WHERE status = 'pending'
                 DO UPDATE SET due_at = excluded.due_at",
                params![
                    ticket.learner_id,
                    ticket.rule_key,
                    ticket.kind.as_str(),
                    ticket.due_at,
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    async fn pending_tickets(
        &self,
        learner_id: &str,
    ) -> Result<Vec<RevisitTicket>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM tickets WHERE learner_id = ?1 AND status = 'pending'
                 ORDER BY due_at ASC",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![learner_id], ticket_from_row)
            .map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
    }

    async fn due_tickets(&self, now: DateTime<Utc>) -> Result<Vec<RevisitTicket>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM tickets WHERE status = 'pending' AND due_at <= ?1
                 ORDER BY due_at ASC",
            )
            .map_err(backend)?;
        let rows = stmt.query_map(params![now], ticket_from_row).map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
    }

    async fn mark_fired(
        &self,
        learner_id: &str,
        rule_key: &str,
        kind: RevisitKind,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE tickets SET status = 'fired'
                 WHERE learner_id = ?1 AND rule_key = ?2 AND kind = ?3 AND status = 'pending'",
                params![learner_id, rule_key, kind.as_str()],
            )
            .map_err(backend)?;
        Ok(())
    }

    async fn cancel_ticket(
        &self,
        learner_id: &str,
        rule_key: &str,
        kind: RevisitKind,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE tickets SET status = 'cancelled'
                 WHERE learner_id = ?1 AND rule_key = ?2 AND kind = ?3 AND status = 'pending'",
                params![learner_id, rule_key, kind.as_str()],
            )
            .map_err(backend)?;
        Ok(())
    }

    async fn load_budget(
        &self,
        learner_id: &str,
        rule_key: &str,
    ) -> Result<DetourBudget, StoreError> {
        let conn = self.conn();
        let budget = conn
            .query_row(
                "SELECT regenerations_used, last_batch_size FROM budgets
                 WHERE learner_id = ?1 AND rule_key = ?2",
                params![learner_id, rule_key],
                |row| {
                    Ok(DetourBudget {
                        learner_id: learner_id.to_string(),
                        rule_key: rule_key.to_string(),
                        regenerations_used: row.get(0)?,
                        last_batch_size: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(backend)?;
        Ok(budget.unwrap_or_else(|| DetourBudget::new(learner_id, rule_key)))
    }

    async fn save_budget(&self, budget: &DetourBudget) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO budgets (learner_id, rule_key, regenerations_used, last_batch_size)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(learner_id, rule_key) DO UPDATE SET
                     regenerations_used = excluded.regenerations_used,
                     last_batch_size = excluded.last_batch_size",
                params![
                    budget.learner_id,
                    budget.rule_key,
                    budget.regenerations_used,
                    budget.last_batch_size,
                ],
            )
            .map_err(backend)?;
        Ok(())
    }
}
