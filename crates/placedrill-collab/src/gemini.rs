//! Gemini explanation collaborator.
//!
//! Wire contract: the model's first response line is exactly `CORRECT`
//! or `WRONG` (the flip signal), followed by a short explanation in the
//! learner's UI language. Example sentences stay in English.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use placedrill_core::model::UiLang;
use placedrill_core::traits::{ExplainRequest, ExplainResponse, Explainer};

use crate::error::CollabError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Gemini generateContent client implementing [`Explainer`].
pub struct GeminiExplainer {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiExplainer {
    pub fn new(api_key: &str, model: Option<String>, base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            api_key: api_key.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    message: String,
}

fn build_prompt(request: &ExplainRequest) -> String {
    let language = match request.ui_lang {
        UiLang::En => "English",
        UiLang::Uk => "Ukrainian",
    };
    format!(
        "You are grading one answer in an English placement test.\n\
         Question: {prompt}\n\
         Expected answer: {canonical}\n\
         Learner's answer: {answer}\n\n\
         Is the learner's answer also a correct way to answer this question?\n\
         Reply with exactly CORRECT or WRONG on the first line.\n\
         Then explain in 1-3 short sentences, written in {language}.\n\
         Keep any example sentences in English, untranslated.",
        prompt = request.prompt,
        canonical = request.canonical,
        answer = request.user_answer,
    )
}

/// Split the model output into the flip signal and the explanation text.
///
/// A response that does not start with CORRECT/WRONG is treated as a
/// non-flip with the whole text as explanation.
fn parse_reply(text: &str) -> (bool, String) {
    let mut lines = text.trim().lines();
    let first = lines.next().unwrap_or("").trim();
    let rest = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    match first.to_ascii_uppercase().as_str() {
        "CORRECT" => (true, rest),
        "WRONG" => (false, rest),
        _ => {
            tracing::warn!(first_line = first, "collaborator reply missing verdict line");
            (false, text.trim().to_string())
        }
    }
}

#[async_trait]
impl Explainer for GeminiExplainer {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn explain(&self, request: &ExplainRequest) -> anyhow::Result<ExplainResponse> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: build_prompt(request),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 256,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollabError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else {
                    CollabError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(CollabError::RateLimited {
                retry_after_ms: retry_after,
            }
            .into());
        }
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(CollabError::AuthenticationFailed(body).into());
        }
        if status == 404 {
            return Err(CollabError::ModelNotFound(self.model.clone()).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CollabError::ApiError { status, message }.into());
        }

        let api_response: GeminiResponse =
            response.json().await.map_err(|e| CollabError::ApiError {
                status: 0,
                message: format!("failed to parse response: {e}"),
            })?;

        let text = api_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();

        let (flip, explanation) = parse_reply(&text);
        Ok(ExplainResponse {
            text: explanation,
            flip,
        })
    }
}
