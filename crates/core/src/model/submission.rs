use serde::{Deserialize, Serialize};

use crate::model::ids::{QuestionId, SessionId};
use crate::model::option_key::AnswerChoice;

/// Score of a submitted attempt.
///
/// Computed once per successful submission; `answered + unanswered` always
/// equals `total_questions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub total_questions: u32,
    pub correct_count: u32,
    pub answered_count: u32,
    pub unanswered_count: u32,
    /// Rounded score in `0..=100`.
    pub percentage: u8,
    pub time_spent_seconds: u32,
    pub total_allotted_seconds: u32,
}

/// One persisted row per question in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub choice: AnswerChoice,
    pub is_correct: bool,
}
