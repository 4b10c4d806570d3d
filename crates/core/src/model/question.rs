use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::option_key::{AnswerChoice, OptionKey};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// A four-option multiple-choice question.
///
/// Immutable once built. The correct key is stored already normalized, so
/// comparisons never need to look at how the backend spelled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: [String; 4],
    correct_key: OptionKey,
    explanation: Option<String>,
}

impl Question {
    /// Build a question from its parts.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` if the prompt is blank.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: [String; 4],
        correct_key: OptionKey,
        explanation: Option<String>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        let explanation = explanation.filter(|e| !e.trim().is_empty());

        Ok(Self {
            id,
            text,
            options,
            correct_key,
            explanation,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String; 4] {
        &self.options
    }

    #[must_use]
    pub fn option(&self, key: OptionKey) -> &str {
        &self.options[key.index()]
    }

    #[must_use]
    pub fn correct_key(&self) -> OptionKey {
        self.correct_key
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Unattempted never counts as correct.
    #[must_use]
    pub fn is_correct(&self, choice: AnswerChoice) -> bool {
        choice.key() == Some(self.correct_key)
    }
}
