//! Mock explainer for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use placedrill_core::traits::{ExplainRequest, ExplainResponse, Explainer};

/// A mock explanation collaborator for exercising the engine without
/// real API calls.
///
/// Flip decisions are keyed by the learner's normalized answer; anything
/// unlisted gets the default (no flip).
pub struct MockExplainer {
    /// Map of user answer -> flip decision.
    flips: HashMap<String, bool>,
    default_flip: bool,
    explanation: String,
    fail: bool,
    delay: Option<Duration>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<ExplainRequest>>,
}

impl MockExplainer {
    /// Flip only the listed answers; everything else stays wrong.
    pub fn new(flips: HashMap<String, bool>) -> Self {
        Self {
            flips,
            default_flip: false,
            explanation: "An equivalent phrasing is acceptable here.".to_string(),
            fail: false,
            delay: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that gives the same verdict to every answer.
    pub fn with_fixed_flip(flip: bool) -> Self {
        Self {
            flips: HashMap::new(),
            default_flip: flip,
            explanation: "An equivalent phrasing is acceptable here.".to_string(),
            fail: false,
            delay: None,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock whose every call fails, for fallback-path tests.
    pub fn failing() -> Self {
        let mut mock = Self::with_fixed_flip(false);
        mock.fail = true;
        mock
    }

    /// Delay every reply, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<ExplainRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Explainer for MockExplainer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn explain(&self, request: &ExplainRequest) -> anyhow::Result<ExplainResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            anyhow::bail!("mock collaborator failure");
        }

        let flip = self
            .flips
            .get(&request.user_answer)
            .copied()
            .unwrap_or(self.default_flip);
        Ok(ExplainResponse {
            text: self.explanation.clone(),
            flip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placedrill_core::model::UiLang;

    fn request(answer: &str) -> ExplainRequest {
        ExplainRequest {
            prompt: "The cat is ___ the box.".into(),
            canonical: "in".into(),
            user_answer: answer.into(),
            ui_lang: UiLang::En,
        }
    }

    #[tokio::test]
    async fn flips_only_listed_answers() {
        let mut flips = HashMap::new();
        flips.insert("inside".to_string(), true);
        let mock = MockExplainer::new(flips);

        let response = mock.explain(&request("inside")).await.unwrap();
        assert!(response.flip);
        let response = mock.explain(&request("on")).await.unwrap();
        assert!(!response.flip);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn failing_mock_errors() {
        let mock = MockExplainer::failing();
        assert!(mock.explain(&request("inside")).await.is_err());
        assert_eq!(
            mock.last_request().unwrap().user_answer,
            "inside".to_string()
        );
    }
}
