//! Scoring & verdict logic.
//!
//! Turns a match outcome into a final verdict, optionally consulting the
//! explanation collaborator for a flip. The collaborator call is bounded
//! by a timeout and every failure path falls back to a conservative
//! non-flip: the engine never blocks the learner and never assumes
//! correctness on collaborator failure.

use std::time::Duration;

use crate::matcher::{self, MatchError, MatchOutcome};
use crate::model::{AssessmentItem, Outcome, UiLang};
use crate::traits::{ExplainRequest, Explainer};

/// Final verdict for one submitted answer.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub outcome: Outcome,
    pub normalized: String,
    /// Explanation text produced by the collaborator, flip or not.
    pub explanation: Option<String>,
}

/// Result of one flip evaluation.
#[derive(Debug, Clone)]
pub enum FlipDecision {
    /// The collaborator accepted the answer; carries the explanation.
    Flip(String),
    /// No flip; carries any explanation text that was still produced.
    NoFlip(Option<String>),
}

/// Ask the collaborator whether a mismatched answer should be accepted.
///
/// Timeouts and errors are logged and decay to `NoFlip`.
pub async fn evaluate_flip(
    explainer: &dyn Explainer,
    item: &AssessmentItem,
    normalized: &str,
    timeout: Duration,
    lang: UiLang,
) -> FlipDecision {
    let request = ExplainRequest {
        prompt: item.prompt.clone(),
        canonical: item.canonical.clone(),
        user_answer: normalized.to_string(),
        ui_lang: lang,
    };

    match tokio::time::timeout(timeout, explainer.explain(&request)).await {
        Ok(Ok(response)) => {
            if response.flip {
                tracing::info!(
                    item_id = %item.id,
                    collaborator = explainer.name(),
                    "verdict flipped to correct"
                );
                FlipDecision::Flip(response.text)
            } else {
                let text = if response.text.is_empty() {
                    None
                } else {
                    Some(response.text)
                };
                FlipDecision::NoFlip(text)
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(
                item_id = %item.id,
                collaborator = explainer.name(),
                error = %e,
                "explanation collaborator unavailable, scoring without flip"
            );
            FlipDecision::NoFlip(None)
        }
        Err(_) => {
            tracing::warn!(
                item_id = %item.id,
                collaborator = explainer.name(),
                timeout_secs = timeout.as_secs(),
                "explanation collaborator timed out, scoring without flip"
            );
            FlipDecision::NoFlip(None)
        }
    }
}

/// Combine a match outcome and an optional flip decision into a verdict.
pub fn finalize(outcome: MatchOutcome, flip: Option<FlipDecision>) -> Verdict {
    if outcome.matched {
        return Verdict {
            outcome: Outcome::Correct,
            normalized: outcome.normalized,
            explanation: None,
        };
    }
    match flip {
        Some(FlipDecision::Flip(text)) => Verdict {
            outcome: Outcome::FlippedCorrect,
            normalized: outcome.normalized,
            explanation: Some(text),
        },
        Some(FlipDecision::NoFlip(text)) => Verdict {
            outcome: Outcome::Incorrect,
            normalized: outcome.normalized,
            explanation: text,
        },
        None => Verdict {
            outcome: Outcome::Incorrect,
            normalized: outcome.normalized,
            explanation: None,
        },
    }
}

/// One-shot scoring: match, then flip evaluation when allowed.
///
/// The session state machine performs the two steps separately so the
/// per-learner lock is not held across the collaborator call; this
/// combined form serves tests and the simulator.
pub async fn score(
    item: &AssessmentItem,
    raw: &str,
    flip_allowed: bool,
    explainer: Option<&dyn Explainer>,
    timeout: Duration,
    lang: UiLang,
) -> Result<Verdict, MatchError> {
    let outcome = matcher::match_answer(item, raw)?;
    if outcome.matched {
        return Ok(finalize(outcome, None));
    }
    let flip = match explainer {
        Some(explainer) if flip_allowed => {
            Some(evaluate_flip(explainer, item, &outcome.normalized, timeout, lang).await)
        }
        _ => None,
    };
    Ok(finalize(outcome, flip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemKind;
    use crate::traits::ExplainResponse;
    use async_trait::async_trait;

    struct StubExplainer {
        flip: bool,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Explainer for StubExplainer {
        fn name(&self) -> &str {
            "stub"
        }

        async fn explain(&self, _request: &ExplainRequest) -> anyhow::Result<ExplainResponse> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("collaborator offline");
            }
            Ok(ExplainResponse {
                text: "The preposition 'inside' is equivalent here.".into(),
                flip: self.flip,
            })
        }
    }

    fn item() -> AssessmentItem {
        AssessmentItem {
            id: "ft-1".into(),
            rule_key: "unit_1".into(),
            kind: ItemKind::Freetext,
            instruction: None,
            prompt: "The cat is ___ the box.".into(),
            canonical: "in".into(),
            accepted_variants: vec![],
            options: vec![],
            sequence: 1,
        }
    }

    #[tokio::test]
    async fn matched_answer_is_correct_without_collaborator() {
        let verdict = score(&item(), "IN", true, None, Duration::from_secs(1), UiLang::En)
            .await
            .unwrap();
        assert_eq!(verdict.outcome, Outcome::Correct);
        assert!(verdict.explanation.is_none());
    }

    #[tokio::test]
    async fn flip_signal_yields_flipped_correct() {
        let explainer = StubExplainer {
            flip: true,
            fail: false,
            delay: None,
        };
        let verdict = score(
            &item(),
            "inside",
            true,
            Some(&explainer),
            Duration::from_secs(1),
            UiLang::En,
        )
        .await
        .unwrap();
        assert_eq!(verdict.outcome, Outcome::FlippedCorrect);
        assert!(verdict.explanation.is_some());
    }

    #[tokio::test]
    async fn decline_keeps_incorrect_with_explanation() {
        let explainer = StubExplainer {
            flip: false,
            fail: false,
            delay: None,
        };
        let verdict = score(
            &item(),
            "on",
            true,
            Some(&explainer),
            Duration::from_secs(1),
            UiLang::En,
        )
        .await
        .unwrap();
        assert_eq!(verdict.outcome, Outcome::Incorrect);
        assert!(verdict.explanation.is_some());
    }

    #[tokio::test]
    async fn collaborator_failure_falls_back_to_incorrect() {
        let explainer = StubExplainer {
            flip: true,
            fail: true,
            delay: None,
        };
        let verdict = score(
            &item(),
            "on",
            true,
            Some(&explainer),
            Duration::from_secs(1),
            UiLang::En,
        )
        .await
        .unwrap();
        assert_eq!(verdict.outcome, Outcome::Incorrect);
        assert!(verdict.explanation.is_none());
    }

    #[tokio::test]
    async fn collaborator_timeout_falls_back_to_incorrect() {
        let explainer = StubExplainer {
            flip: true,
            fail: false,
            delay: Some(Duration::from_millis(200)),
        };
        let verdict = score(
            &item(),
            "on",
            true,
            Some(&explainer),
            Duration::from_millis(20),
            UiLang::En,
        )
        .await
        .unwrap();
        assert_eq!(verdict.outcome, Outcome::Incorrect);
    }

    #[tokio::test]
    async fn flip_not_allowed_skips_collaborator() {
        let explainer = StubExplainer {
            flip: true,
            fail: false,
            delay: None,
        };
        let verdict = score(
            &item(),
            "on",
            false,
            Some(&explainer),
            Duration::from_secs(1),
            UiLang::En,
        )
        .await
        .unwrap();
        assert_eq!(verdict.outcome, Outcome::Incorrect);
        assert!(verdict.explanation.is_none());
    }
}
