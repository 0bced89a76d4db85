//! Session state machine: the single entry point for learner turns.
//!
//! One logical engine instance processes inbound events. Sessions are
//! independent units of concurrency; turns for the same learner are
//! serialized by a per-learner async lock. The lock is never held across
//! the explanation-collaborator call: the engine records the session
//! revision, releases the lock, performs the call, re-acquires, and
//! discards the collaborator result if the session moved underneath it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::detour::{self, DetourOutcome};
use crate::error::{EngineError, StoreError};
use crate::grader::{self, Verdict};
use crate::matcher;
use crate::model::{
    AssessmentItem, AttemptRecord, DetourProgress, LearnerSession, Outcome, Phase, RevisitKind,
    RevisitProgress, RevisitTicket, UiLang,
};
use crate::prompt::{
    render_batch, render_incorrect, render_item, ui_text, OutboundPrompt, PromptKind,
};
use crate::scheduler;
use crate::traits::{ContentStore, Explainer, StateStore};

/// A due-ticket prompt produced by `poll_due`, one per learner.
#[derive(Debug, Clone)]
pub struct DueDelivery {
    pub learner_id: String,
    pub rule_key: String,
    pub kind: RevisitKind,
    pub prompt: OutboundPrompt,
}

/// What kind of answer the inbound message is, derived from the phase.
#[derive(Debug, Clone)]
enum AnswerCtx {
    Placement,
    Detour(DetourProgress),
    Revisit(RevisitKind, RevisitProgress),
}

/// The assessment & spaced-repetition engine.
pub struct Engine {
    content: Arc<dyn ContentStore>,
    store: Arc<dyn StateStore>,
    explainer: Option<Arc<dyn Explainer>>,
    config: EngineConfig,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Engine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        store: Arc<dyn StateStore>,
        explainer: Option<Arc<dyn Explainer>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            content,
            store,
            explainer,
            config,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn learner_lock(&self, learner_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(learner_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Retry a state write once before giving up on the turn. Writes are
    /// idempotent (keyed by learner/rule/kind), so the retry is safe.
    async fn with_retry<F, Fut>(&self, op: F) -> Result<(), StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        match op().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "state write failed, retrying once");
                op().await
            }
        }
    }

    /// Handle one inbound learner message and produce the reply.
    pub async fn handle_message(
        &self,
        learner_id: &str,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboundPrompt, EngineError> {
        let lock = self.learner_lock(learner_id);
        let mut guard = lock.lock().await;

        let mut session = match self.store.load_session(learner_id).await? {
            Some(session) => session,
            None => {
                let session = LearnerSession::new(learner_id, UiLang::default(), now);
                self.with_retry(|| self.store.save_session(&session)).await?;
                tracing::info!(learner_id, "session created");
                return Ok(OutboundPrompt::new(
                    PromptKind::AskLanguage,
                    ui_text(UiLang::default(), "ask_language"),
                ));
            }
        };

        let ctx = match &session.phase {
            Phase::Onboarding => {
                let prompt = self.handle_onboarding(&mut session, raw, now).await?;
                session.touch(now);
                self.with_retry(|| self.store.save_session(&session)).await?;
                return Ok(prompt);
            }
            Phase::Completed => {
                return Ok(OutboundPrompt::new(
                    PromptKind::Completed,
                    ui_text(session.ui_lang, "completed"),
                ));
            }
            Phase::Placement => AnswerCtx::Placement,
            Phase::Detour(progress) => AnswerCtx::Detour(progress.clone()),
            Phase::AwaitingRevisit(progress) => {
                AnswerCtx::Revisit(RevisitKind::ShortDelay, progress.clone())
            }
            Phase::WeeklyCheck(progress) => {
                AnswerCtx::Revisit(RevisitKind::WeekCheck, progress.clone())
            }
        };

        let Some(item) = self.resolve_item(&session, &ctx).await? else {
            // Placement pointer already past the end: nothing to grade.
            let prompt = self.next_main_prompt(&mut session, now, None).await?;
            session.touch(now);
            self.with_retry(|| self.store.save_session(&session)).await?;
            return Ok(prompt);
        };

        let matched = matcher::match_answer(&item, raw)?;

        // Verdict, with the flip evaluation outside the per-learner lock.
        let verdict = if matched.matched {
            grader::finalize(matched, None)
        } else if let Some(explainer) = self.explainer.clone() {
            let key = LearnerSession::flip_key(&item.id, &matched.normalized);
            if session.flip_checked.contains(&key) {
                grader::finalize(matched, None)
            } else {
                session.flip_checked.insert(key);
                session.touch(now);
                // Persist the flip marker before the external call so a
                // crash cannot re-trigger the collaborator for this answer.
                self.with_retry(|| self.store.save_session(&session)).await?;
                let revision = session.revision;

                drop(guard);
                let decision = grader::evaluate_flip(
                    explainer.as_ref(),
                    &item,
                    &matched.normalized,
                    self.config.explain_timeout(),
                    session.ui_lang,
                )
                .await;
                guard = lock.lock().await;

                let fresh = self
                    .store
                    .load_session(learner_id)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Backend(format!("session vanished for {learner_id}"))
                    })?;
                if fresh.revision != revision {
                    tracing::warn!(
                        learner_id,
                        "session changed during collaborator call, discarding flip result"
                    );
                    session = fresh;
                    if current_item_id(&session) != Some(item.id.as_str()) {
                        // Another turn already resolved this item; record
                        // the attempt and re-serve whatever is pending now.
                        let verdict = grader::finalize(matched, None);
                        self.append_attempt(&session, &item, raw, &verdict, now).await?;
                        let prompt = self.next_main_prompt(&mut session, now, None).await?;
                        session.touch(now);
                        self.with_retry(|| self.store.save_session(&session)).await?;
                        drop(guard);
                        return Ok(prompt);
                    }
                    grader::finalize(matched, None)
                } else {
                    session = fresh;
                    grader::finalize(matched, Some(decision))
                }
            }
        } else {
            grader::finalize(matched, None)
        };

        self.append_attempt(&session, &item, raw, &verdict, now).await?;

        let prompt = match ctx {
            AnswerCtx::Placement => {
                self.after_placement_answer(&mut session, &item, &verdict, now)
                    .await?
            }
            AnswerCtx::Detour(progress) => {
                self.after_detour_answer(&mut session, progress, &item, &verdict, now)
                    .await?
            }
            AnswerCtx::Revisit(kind, progress) => {
                self.after_revisit_answer(&mut session, kind, progress, &verdict, &item, now)
                    .await?
            }
        };

        session.touch(now);
        self.with_retry(|| self.store.save_session(&session)).await?;
        drop(guard);
        Ok(prompt)
    }

    /// Surface due tickets across all learners as outbound prompts.
    ///
    /// Tickets stay pending until `ack_delivery` (or the learner's
    /// answer) confirms delivery, so a failed send is retried on the
    /// next poll. At most one recheck is in flight per learner.
    pub async fn poll_due(&self, now: DateTime<Utc>) -> Result<Vec<DueDelivery>, EngineError> {
        let due = scheduler::order_due(self.store.due_tickets(now).await?);
        let mut deliveries = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for ticket in due {
            if !seen.insert(ticket.learner_id.clone()) {
                continue;
            }
            let lock = self.learner_lock(&ticket.learner_id);
            let _guard = lock.lock().await;

            let Some(mut session) = self.store.load_session(&ticket.learner_id).await? else {
                continue;
            };
            match &session.phase {
                Phase::Onboarding => continue,
                Phase::AwaitingRevisit(progress) | Phase::WeeklyCheck(progress) => {
                    // Already parked on a recheck. If it is this ticket's
                    // question, the earlier send was never acked; re-emit
                    // the same prompt instead of dropping it.
                    let same_ticket = progress.rule_key == ticket.rule_key
                        && matches!(
                            (&session.phase, ticket.kind),
                            (Phase::AwaitingRevisit(_), RevisitKind::ShortDelay)
                                | (Phase::WeeklyCheck(_), RevisitKind::WeekCheck)
                        );
                    if same_ticket {
                        let item = self
                            .content
                            .item(&progress.item_id)
                            .await
                            .map_err(|e| EngineError::Content(e.to_string()))?
                            .ok_or_else(|| {
                                EngineError::MissingContent(progress.item_id.clone())
                            })?;
                        deliveries.push(DueDelivery {
                            learner_id: ticket.learner_id.clone(),
                            rule_key: ticket.rule_key.clone(),
                            kind: ticket.kind,
                            prompt: OutboundPrompt::new(
                                PromptKind::Question,
                                render_revisit(session.ui_lang, ticket.kind, &item),
                            ),
                        });
                    }
                    continue;
                }
                _ => {}
            }

            let Some(item) = self.pick_revisit_item(&ticket.rule_key, &session).await? else {
                tracing::warn!(
                    rule_key = %ticket.rule_key,
                    "no servable exercise for due ticket, resolving it"
                );
                self.with_retry(|| {
                    self.store
                        .mark_fired(&ticket.learner_id, &ticket.rule_key, ticket.kind)
                })
                .await?;
                continue;
            };

            let text = self.enter_revisit(&mut session, &ticket, &item);
            session.touch(now);
            self.with_retry(|| self.store.save_session(&session)).await?;
            deliveries.push(DueDelivery {
                learner_id: ticket.learner_id.clone(),
                rule_key: ticket.rule_key.clone(),
                kind: ticket.kind,
                prompt: OutboundPrompt::new(PromptKind::Question, text),
            });
        }
        Ok(deliveries)
    }

    /// Confirm a `poll_due` prompt reached the learner: commits the
    /// ticket to fired. Idempotent.
    pub async fn ack_delivery(
        &self,
        learner_id: &str,
        rule_key: &str,
        kind: RevisitKind,
    ) -> Result<(), EngineError> {
        let lock = self.learner_lock(learner_id);
        let _guard = lock.lock().await;
        self.with_retry(|| self.store.mark_fired(learner_id, rule_key, kind))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Phase handlers
    // -----------------------------------------------------------------

    async fn handle_onboarding(
        &self,
        session: &mut LearnerSession,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboundPrompt, EngineError> {
        match raw.parse::<UiLang>() {
            Ok(lang) => {
                session.ui_lang = lang;
                session.phase = Phase::Placement;
                tracing::info!(learner_id = %session.learner_id, %lang, "placement started");
                self.next_main_prompt(session, now, None).await
            }
            Err(_) => Ok(OutboundPrompt::new(
                PromptKind::AskLanguage,
                ui_text(session.ui_lang, "ask_language"),
            )),
        }
    }

    async fn after_placement_answer(
        &self,
        session: &mut LearnerSession,
        item: &AssessmentItem,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Result<OutboundPrompt, EngineError> {
        session.attempts_this_item += 1;
        if verdict.outcome.is_correct() {
            session.solved_items.insert(item.id.clone());
            session.attempts_this_item = 0;
            session.placement_pos += 1;
            let feedback = feedback_correct(verdict, session.ui_lang);
            self.next_main_prompt(session, now, Some(feedback)).await
        } else {
            let feedback = render_incorrect(item, verdict.explanation.as_deref(), session.ui_lang);
            self.start_detour(session, &item.rule_key, now, feedback, None)
                .await
        }
    }

    async fn after_detour_answer(
        &self,
        session: &mut LearnerSession,
        mut progress: DetourProgress,
        item: &AssessmentItem,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Result<OutboundPrompt, EngineError> {
        session.attempts_this_item += 1;
        if !verdict.outcome.is_correct() {
            // A miss mid-batch regenerates (or escalates) the whole rule.
            let feedback = render_incorrect(item, verdict.explanation.as_deref(), session.ui_lang);
            return self
                .start_detour(session, &progress.rule_key, now, feedback, progress.resume.take())
                .await;
        }

        session.solved_items.insert(item.id.clone());
        session.attempts_this_item = 0;
        progress.pos += 1;

        if progress.pos < progress.queue.len() {
            let next_id = progress.queue[progress.pos].clone();
            let next = self
                .content
                .item(&next_id)
                .await
                .map_err(|e| EngineError::Content(e.to_string()))?
                .ok_or(EngineError::MissingContent(next_id))?;
            session.phase = Phase::Detour(progress);
            let text = format!(
                "{}\n\n{}",
                feedback_correct(verdict, session.ui_lang),
                render_item(&next)
            );
            return Ok(OutboundPrompt::new(PromptKind::Question, text));
        }

        // Batch complete: book both rechecks, then resume the main flow.
        let rule_key = progress.rule_key.clone();
        self.with_retry(|| {
            scheduler::schedule_after_batch(
                self.store.as_ref(),
                &session.learner_id,
                &rule_key,
                now,
                &self.config,
            )
        })
        .await?;
        session.phase = progress
            .resume
            .take()
            .map(|phase| *phase)
            .unwrap_or(Phase::Placement);
        let prefix = format!(
            "{}\n{}",
            feedback_correct(verdict, session.ui_lang),
            ui_text(session.ui_lang, "back_to_placement")
        );
        self.next_main_prompt(session, now, Some(prefix)).await
    }

    async fn after_revisit_answer(
        &self,
        session: &mut LearnerSession,
        kind: RevisitKind,
        progress: RevisitProgress,
        verdict: &Verdict,
        item: &AssessmentItem,
        now: DateTime<Utc>,
    ) -> Result<OutboundPrompt, EngineError> {
        // The answer doubles as delivery confirmation.
        self.with_retry(|| {
            self.store
                .mark_fired(&session.learner_id, &progress.rule_key, kind)
        })
        .await?;

        if verdict.outcome.is_correct() {
            session.solved_items.insert(item.id.clone());
            session.phase = *progress.resume;
            let feedback = feedback_correct(verdict, session.ui_lang);
            return self.next_main_prompt(session, now, Some(feedback)).await;
        }

        let feedback = render_incorrect(item, verdict.explanation.as_deref(), session.ui_lang);
        match kind {
            RevisitKind::ShortDelay => {
                // A missed recheck re-enters remediation, still bounded by
                // the rule's budget, and books exactly one fresh ticket.
                let rule_key = progress.rule_key.clone();
                self.with_retry(|| {
                    scheduler::reschedule_short_delay(
                        self.store.as_ref(),
                        &session.learner_id,
                        &rule_key,
                        now,
                        &self.config,
                    )
                })
                .await?;
                self.start_detour(session, &rule_key, now, feedback, Some(progress.resume))
                    .await
            }
            RevisitKind::WeekCheck => {
                // Final assessment signal: record the gap, never retry.
                session.standing_gaps.insert(progress.rule_key.clone());
                tracing::info!(
                    learner_id = %session.learner_id,
                    rule_key = %progress.rule_key,
                    "week-check missed, standing gap recorded"
                );
                session.phase = *progress.resume;
                let prefix = format!("{}\n{}", feedback, ui_text(session.ui_lang, "gap_recorded"));
                self.next_main_prompt(session, now, Some(prefix)).await
            }
        }
    }

    // -----------------------------------------------------------------
    // Detour entry
    // -----------------------------------------------------------------

    async fn start_detour(
        &self,
        session: &mut LearnerSession,
        rule_key: &str,
        now: DateTime<Utc>,
        feedback: String,
        resume: Option<Box<Phase>>,
    ) -> Result<OutboundPrompt, EngineError> {
        let remediation = self
            .content
            .remediation(rule_key)
            .await
            .map_err(|e| EngineError::Content(e.to_string()))?;

        let Some(remediation) = remediation else {
            tracing::warn!(rule_key, "no remediation content for missed rule, recording gap");
            session.standing_gaps.insert(rule_key.to_string());
            return self
                .resume_after_rule(session, resume, now, feedback)
                .await;
        };

        let mut budget = self
            .store
            .load_budget(&session.learner_id, rule_key)
            .await?;
        match detour::select_remediation(
            &mut budget,
            &remediation,
            &session.solved_items,
            session.ui_lang,
            &self.config,
        ) {
            DetourOutcome::Batch(batch) => {
                self.with_retry(|| self.store.save_budget(&budget)).await?;
                if batch.exercises.is_empty() {
                    // Nothing left to drill; book the rechecks and move on.
                    let rule = rule_key.to_string();
                    self.with_retry(|| {
                        scheduler::schedule_after_batch(
                            self.store.as_ref(),
                            &session.learner_id,
                            &rule,
                            now,
                            &self.config,
                        )
                    })
                    .await?;
                    return self
                        .resume_after_rule(session, resume, now, feedback)
                        .await;
                }
                let queue: Vec<String> = batch.exercises.iter().map(|e| e.id.clone()).collect();
                session.phase = Phase::Detour(DetourProgress {
                    rule_key: rule_key.to_string(),
                    queue,
                    pos: 0,
                    regeneration: batch.regeneration,
                    resume,
                });
                let text = format!("{feedback}\n\n{}", render_batch(&batch, session.ui_lang));
                Ok(OutboundPrompt::new(PromptKind::Question, text))
            }
            DetourOutcome::Escalate => {
                session.escalated_rules.insert(rule_key.to_string());
                // Escalation is terminal for the rule; outstanding
                // rechecks would only repeat the loop.
                for kind in [RevisitKind::ShortDelay, RevisitKind::WeekCheck] {
                    let rule = rule_key.to_string();
                    self.with_retry(|| self.store.cancel_ticket(&session.learner_id, &rule, kind))
                        .await?;
                }
                let text = format!("{feedback}\n\n{}", ui_text(session.ui_lang, "escalation"));
                let prompt = self
                    .resume_after_rule(session, resume, now, text)
                    .await?;
                Ok(OutboundPrompt::new(PromptKind::Escalation, prompt.text))
            }
        }
    }

    /// Restore the interrupted phase (or skip past the current placement
    /// item) after a rule's remediation path ended without a batch.
    async fn resume_after_rule(
        &self,
        session: &mut LearnerSession,
        resume: Option<Box<Phase>>,
        now: DateTime<Utc>,
        prefix: String,
    ) -> Result<OutboundPrompt, EngineError> {
        match resume {
            Some(phase) => {
                session.phase = *phase;
            }
            None => {
                // The miss happened at the placement pointer; move past it.
                session.phase = Phase::Placement;
                session.placement_pos += 1;
                session.attempts_this_item = 0;
            }
        }
        self.next_main_prompt(session, now, Some(prefix)).await
    }

    // -----------------------------------------------------------------
    // Prompt selection
    // -----------------------------------------------------------------

    /// Emit the next prompt for the session's main phase, preceded by an
    /// optional feedback prefix. A due ticket preempts the main phase.
    async fn next_main_prompt(
        &self,
        session: &mut LearnerSession,
        now: DateTime<Utc>,
        prefix: Option<String>,
    ) -> Result<OutboundPrompt, EngineError> {
        if !matches!(
            session.phase,
            Phase::AwaitingRevisit(_) | Phase::WeeklyCheck(_)
        ) {
            if let Some(ticket) =
                scheduler::next_due_for(self.store.as_ref(), &session.learner_id, now).await?
            {
                if let Some(item) = self.pick_revisit_item(&ticket.rule_key, session).await? {
                    let text = self.enter_revisit(session, &ticket, &item);
                    // The returned prompt is the delivery; commit now.
                    self.with_retry(|| {
                        self.store
                            .mark_fired(&ticket.learner_id, &ticket.rule_key, ticket.kind)
                    })
                    .await?;
                    return Ok(OutboundPrompt::new(
                        PromptKind::Question,
                        join_prefix(prefix, text),
                    ));
                }
                self.with_retry(|| {
                    self.store
                        .mark_fired(&ticket.learner_id, &ticket.rule_key, ticket.kind)
                })
                .await?;
            }
        }

        match session.phase.clone() {
            Phase::Placement => self.placement_prompt(session, now, prefix).await,
            Phase::Detour(progress) => {
                let item_id = detour_slot(&progress)?;
                let item = self
                    .content
                    .item(&item_id)
                    .await
                    .map_err(|e| EngineError::Content(e.to_string()))?
                    .ok_or(EngineError::MissingContent(item_id))?;
                Ok(OutboundPrompt::new(
                    PromptKind::Question,
                    join_prefix(prefix, render_item(&item)),
                ))
            }
            Phase::Completed => Ok(OutboundPrompt::new(
                PromptKind::Completed,
                join_prefix(prefix, ui_text(session.ui_lang, "completed").to_string()),
            )),
            Phase::AwaitingRevisit(progress) | Phase::WeeklyCheck(progress) => {
                let item = self
                    .content
                    .item(&progress.item_id)
                    .await
                    .map_err(|e| EngineError::Content(e.to_string()))?
                    .ok_or(EngineError::MissingContent(progress.item_id.clone()))?;
                Ok(OutboundPrompt::new(
                    PromptKind::Question,
                    join_prefix(prefix, render_item(&item)),
                ))
            }
            Phase::Onboarding => Ok(OutboundPrompt::new(
                PromptKind::AskLanguage,
                ui_text(session.ui_lang, "ask_language"),
            )),
        }
    }

    /// Serve the placement item at the pointer, skipping malformed items,
    /// or close out the run when the set is exhausted.
    async fn placement_prompt(
        &self,
        session: &mut LearnerSession,
        _now: DateTime<Utc>,
        prefix: Option<String>,
    ) -> Result<OutboundPrompt, EngineError> {
        loop {
            let item = self
                .content
                .placement_item(session.placement_pos)
                .await
                .map_err(|e| EngineError::Content(e.to_string()))?;
            match item {
                Some(item) => match matcher::check_item(&item) {
                    Ok(()) => {
                        return Ok(OutboundPrompt::new(
                            PromptKind::Question,
                            join_prefix(prefix, render_item(&item)),
                        ));
                    }
                    Err(e) => {
                        // Operator-facing defect; never shown to the learner.
                        tracing::error!(item_id = %item.id, error = %e, "blocking malformed placement item");
                        session.placement_pos += 1;
                    }
                },
                None => {
                    let pending = self.store.pending_tickets(&session.learner_id).await?;
                    if pending.is_empty() {
                        session.phase = Phase::Completed;
                        session.archived = true;
                        tracing::info!(learner_id = %session.learner_id, "placement completed, session archived");
                        return Ok(OutboundPrompt::new(
                            PromptKind::Completed,
                            join_prefix(prefix, ui_text(session.ui_lang, "completed").to_string()),
                        ));
                    }
                    return Ok(OutboundPrompt::new(
                        PromptKind::Idle,
                        join_prefix(
                            prefix,
                            ui_text(session.ui_lang, "awaiting_rechecks").to_string(),
                        ),
                    ));
                }
            }
        }
    }

    /// Move the session into a revisit phase for a due ticket and render
    /// the recheck question.
    fn enter_revisit(
        &self,
        session: &mut LearnerSession,
        ticket: &RevisitTicket,
        item: &AssessmentItem,
    ) -> String {
        let progress = RevisitProgress {
            rule_key: ticket.rule_key.clone(),
            item_id: item.id.clone(),
            resume: Box::new(session.phase.clone()),
        };
        session.phase = match ticket.kind {
            RevisitKind::ShortDelay => Phase::AwaitingRevisit(progress),
            RevisitKind::WeekCheck => Phase::WeeklyCheck(progress),
        };
        render_revisit(session.ui_lang, ticket.kind, item)
    }

    /// One exercise from the rule's pool for a recheck: the first (by
    /// sequence) the learner hasn't solved, else the first overall. Not
    /// necessarily the originally missed item.
    async fn pick_revisit_item(
        &self,
        rule_key: &str,
        session: &LearnerSession,
    ) -> Result<Option<AssessmentItem>, EngineError> {
        let Some(remediation) = self
            .content
            .remediation(rule_key)
            .await
            .map_err(|e| EngineError::Content(e.to_string()))?
        else {
            return Ok(None);
        };
        let mut pool: Vec<_> = remediation
            .exercises
            .into_iter()
            .filter(|item| matcher::check_item(item).is_ok())
            .collect();
        pool.sort_by_key(|item| item.sequence);
        let unsolved = pool
            .iter()
            .find(|item| !session.solved_items.contains(&item.id))
            .cloned();
        Ok(unsolved.or_else(|| pool.into_iter().next()))
    }

    async fn resolve_item(
        &self,
        session: &LearnerSession,
        ctx: &AnswerCtx,
    ) -> Result<Option<AssessmentItem>, EngineError> {
        let item_id = match ctx {
            AnswerCtx::Placement => {
                return self
                    .content
                    .placement_item(session.placement_pos)
                    .await
                    .map_err(|e| EngineError::Content(e.to_string()));
            }
            AnswerCtx::Detour(progress) => detour_slot(progress)?,
            AnswerCtx::Revisit(_, progress) => progress.item_id.clone(),
        };
        self.content
            .item(&item_id)
            .await
            .map_err(|e| EngineError::Content(e.to_string()))?
            .ok_or(EngineError::MissingContent(item_id))
            .map(Some)
    }

    async fn append_attempt(
        &self,
        session: &LearnerSession,
        item: &AssessmentItem,
        raw: &str,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let attempt = AttemptRecord {
            id: Uuid::new_v4(),
            learner_id: session.learner_id.clone(),
            item_id: item.id.clone(),
            rule_key: item.rule_key.clone(),
            phase: session.phase.label().to_string(),
            raw_input: raw.to_string(),
            normalized_input: verdict.normalized.clone(),
            outcome: verdict.outcome,
            explanation: verdict.explanation.clone(),
            created_at: now,
        };
        tracing::debug!(
            learner_id = %attempt.learner_id,
            item_id = %attempt.item_id,
            outcome = attempt.outcome.as_str(),
            phase = %attempt.phase,
            "attempt recorded"
        );
        self.with_retry(|| self.store.append_attempt(&attempt)).await?;
        Ok(())
    }
}

/// Item id at the batch pointer. A persisted session with a pointer past
/// the queue end surfaces as a missing-content error, not a panic.
fn detour_slot(progress: &DetourProgress) -> Result<String, EngineError> {
    progress
        .queue
        .get(progress.pos)
        .cloned()
        .ok_or_else(|| EngineError::MissingContent(format!("detour batch slot {}", progress.pos)))
}

/// Recheck prompt text: kind-specific intro plus the exercise.
fn render_revisit(lang: UiLang, kind: RevisitKind, item: &AssessmentItem) -> String {
    let intro_key = match kind {
        RevisitKind::ShortDelay => "revisit_intro",
        RevisitKind::WeekCheck => "check_intro",
    };
    format!("{}\n{}", ui_text(lang, intro_key), render_item(item))
}

/// Item id the session is currently waiting on, if any.
fn current_item_id(session: &LearnerSession) -> Option<&str> {
    match &session.phase {
        Phase::Detour(progress) => progress.queue.get(progress.pos).map(String::as_str),
        Phase::AwaitingRevisit(progress) | Phase::WeeklyCheck(progress) => {
            Some(progress.item_id.as_str())
        }
        _ => None,
    }
}

fn feedback_correct(verdict: &Verdict, lang: UiLang) -> String {
    match verdict.outcome {
        Outcome::FlippedCorrect => match &verdict.explanation {
            Some(explanation) => format!("{}\n{explanation}", ui_text(lang, "flipped")),
            None => ui_text(lang, "flipped").to_string(),
        },
        _ => ui_text(lang, "correct").to_string(),
    }
}

fn join_prefix(prefix: Option<String>, text: String) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}\n\n{text}"),
        None => text,
    }
}
