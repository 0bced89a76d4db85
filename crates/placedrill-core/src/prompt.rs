//! Outbound prompt rendering.
//!
//! The engine replies with plain text the transport can forward as-is.
//! UI chrome is bilingual (en/uk); item content and examples stay
//! English by contract.

use crate::model::{AssessmentItem, RemediationBatch, UiLang};

/// What the engine expects the learner to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Waiting for a UI-language choice.
    AskLanguage,
    /// Waiting for an answer to a question.
    Question,
    /// Detour budget exhausted; no answer expected for this rule.
    Escalation,
    /// Assessment finished, session archived.
    Completed,
    /// Nothing pending right now.
    Idle,
}

/// One outbound message to a learner.
#[derive(Debug, Clone)]
pub struct OutboundPrompt {
    pub kind: PromptKind,
    pub text: String,
}

impl OutboundPrompt {
    pub fn new(kind: PromptKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Fixed UI strings.
pub fn ui_text(lang: UiLang, key: &str) -> &'static str {
    match (lang, key) {
        (_, "ask_language") => "Choose your language / Оберіть мову: en / uk",
        (UiLang::En, "correct") => "Correct!",
        (UiLang::Uk, "correct") => "Правильно!",
        (UiLang::En, "flipped") => "Accepted, your wording works too.",
        (UiLang::Uk, "flipped") => "Зараховано, ваш варіант теж підходить.",
        (UiLang::En, "incorrect") => "Not quite. The correct answer:",
        (UiLang::Uk, "incorrect") => "Не зовсім. Правильна відповідь:",
        (UiLang::En, "detour_intro") => "Let's review this rule before moving on.",
        (UiLang::Uk, "detour_intro") => "Розберімо це правило, перш ніж рухатися далі.",
        (UiLang::En, "examples") => "Examples:",
        (UiLang::Uk, "examples") => "Приклади:",
        (UiLang::En, "back_to_placement") => "Nice work. Back to the test, try this one again.",
        (UiLang::Uk, "back_to_placement") => "Гарна робота. Повертаємось до тесту, спробуйте ще раз.",
        (UiLang::En, "revisit_intro") => "Quick recheck of an earlier rule:",
        (UiLang::Uk, "revisit_intro") => "Швидка перевірка попереднього правила:",
        (UiLang::En, "check_intro") => "Weekly check:",
        (UiLang::Uk, "check_intro") => "Тижнева перевірка:",
        (UiLang::En, "gap_recorded") => {
            "Noted, we'll flag this rule for your next study plan."
        }
        (UiLang::Uk, "gap_recorded") => {
            "Зафіксовано, ми позначимо це правило для подальшого навчання."
        }
        (UiLang::En, "escalation") => {
            "This topic needs more help than I can give. Please ask your instructor about it."
        }
        (UiLang::Uk, "escalation") => {
            "Ця тема потребує додаткової допомоги. Будь ласка, зверніться до викладача."
        }
        (UiLang::En, "completed") => "That's the whole placement test. Great job!",
        (UiLang::Uk, "completed") => "Це весь тест. Чудова робота!",
        (UiLang::En, "awaiting_rechecks") => {
            "All questions answered. A few rechecks are still scheduled, I'll ping you."
        }
        (UiLang::Uk, "awaiting_rechecks") => {
            "Усі питання пройдено. Залишилися заплановані перевірки, я нагадаю."
        }
        (UiLang::En, "idle") => "Nothing due right now.",
        (UiLang::Uk, "idle") => "Наразі нічого не заплановано.",
        (UiLang::En, "retry") => "Something went wrong on our side. Please resend your answer.",
        (UiLang::Uk, "retry") => "Щось пішло не так. Будь ласка, надішліть відповідь ще раз.",
        _ => "",
    }
}

/// Render a question: instruction, prompt, lettered options.
pub fn render_item(item: &AssessmentItem) -> String {
    let mut text = String::new();
    if let Some(instruction) = &item.instruction {
        text.push_str(instruction);
        text.push_str("\n\n");
    }
    text.push_str(&item.prompt);
    for (i, option) in item.options.iter().enumerate() {
        let label = (b'A' + i as u8) as char;
        text.push_str(&format!("\n{label}) {option}"));
    }
    text
}

/// Render a remediation batch intro: explanation, examples, first exercise.
pub fn render_batch(batch: &RemediationBatch, lang: UiLang) -> String {
    let mut text = format!("{}\n\n{}", ui_text(lang, "detour_intro"), batch.explanation);
    if !batch.examples.is_empty() {
        text.push_str("\n\n");
        text.push_str(ui_text(lang, "examples"));
        for example in &batch.examples {
            text.push_str(&format!("\n• {example}"));
        }
    }
    if let Some(first) = batch.exercises.first() {
        text.push_str("\n\n");
        text.push_str(&render_item(first));
    }
    text
}

/// Feedback line for a wrong answer, revealing the canonical.
pub fn render_incorrect(item: &AssessmentItem, explanation: Option<&str>, lang: UiLang) -> String {
    let mut text = format!("{} {}", ui_text(lang, "incorrect"), item.canonical);
    if let Some(explanation) = explanation {
        text.push_str("\n");
        text.push_str(explanation);
    }
    text
}
