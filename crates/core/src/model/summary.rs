use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::exam::{ExamCategory, ExamConfig};
use crate::model::ids::{SessionId, UserId};
use crate::model::submission::SubmissionResult;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SummaryError {
    #[error("answered ({answered}) + unanswered ({unanswered}) does not match total ({total})")]
    CountMismatch {
        total: u32,
        answered: u32,
        unanswered: u32,
    },

    #[error("score ({score}) exceeds answered count ({answered})")]
    ScoreExceedsAnswered { score: u32, answered: u32 },

    #[error("percentage out of range: {0}")]
    InvalidPercentage(u8),

    #[error("time taken ({taken}s) exceeds time given ({given}s)")]
    InvalidTime { taken: u32, given: u32 },
}

/// Persisted summary of one submitted exam attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSummary {
    session_id: SessionId,
    user_id: UserId,
    category: ExamCategory,
    submitted_at: DateTime<Utc>,
    result: SubmissionResult,
}

impl ExamSummary {
    /// Summary for a freshly scored attempt.
    #[must_use]
    pub fn from_result(
        config: &ExamConfig,
        user_id: UserId,
        result: SubmissionResult,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: config.session_id(),
            user_id,
            category: config.category().clone(),
            submitted_at,
            result,
        }
    }

    /// Rehydrate a summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError` if the stored counts are inconsistent.
    pub fn from_persisted(
        session_id: SessionId,
        user_id: UserId,
        category: ExamCategory,
        submitted_at: DateTime<Utc>,
        result: SubmissionResult,
    ) -> Result<Self, SummaryError> {
        let SubmissionResult {
            total_questions,
            correct_count,
            answered_count,
            unanswered_count,
            percentage,
            time_spent_seconds,
            total_allotted_seconds,
        } = result;

        if answered_count.checked_add(unanswered_count) != Some(total_questions) {
            return Err(SummaryError::CountMismatch {
                total: total_questions,
                answered: answered_count,
                unanswered: unanswered_count,
            });
        }
        if correct_count > answered_count {
            return Err(SummaryError::ScoreExceedsAnswered {
                score: correct_count,
                answered: answered_count,
            });
        }
        if percentage > 100 {
            return Err(SummaryError::InvalidPercentage(percentage));
        }
        if time_spent_seconds > total_allotted_seconds {
            return Err(SummaryError::InvalidTime {
                taken: time_spent_seconds,
                given: total_allotted_seconds,
            });
        }

        Ok(Self {
            session_id,
            user_id,
            category,
            submitted_at,
            result,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn category(&self) -> &ExamCategory {
        &self.category
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    #[must_use]
    pub fn result(&self) -> &SubmissionResult {
        &self.result
    }
}
