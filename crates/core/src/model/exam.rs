use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::SessionId;

/// Time allowed per question (1.5 minutes).
pub const SECONDS_PER_QUESTION: u32 = 90;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamConfigError {
    #[error("exam category cannot be empty")]
    EmptyCategory,
}

/// Exam track a question belongs to (e.g. `CPA`, `CFA`, `FE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExamCategory(String);

impl ExamCategory {
    /// # Errors
    ///
    /// Returns `ExamConfigError::EmptyCategory` if the name is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, ExamConfigError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ExamConfigError::EmptyCategory);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable input for one timed-exam attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamConfig {
    category: ExamCategory,
    question_count: u32,
    session_id: SessionId,
}

impl ExamConfig {
    #[must_use]
    pub fn new(category: ExamCategory, question_count: u32, session_id: SessionId) -> Self {
        Self {
            category,
            question_count,
            session_id,
        }
    }

    #[must_use]
    pub fn category(&self) -> &ExamCategory {
        &self.category
    }

    /// Requested number of questions; bounds the fetch and the clock.
    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Seconds on the clock at the start of the attempt.
    #[must_use]
    pub fn total_allotted_seconds(&self) -> u32 {
        self.question_count.saturating_mul(SECONDS_PER_QUESTION)
    }
}
