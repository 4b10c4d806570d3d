use prep_core::model::{AnswerMap, ExamCategory, Question, SessionId, SubmissionResult};

use super::session::{ExamSession, ExamState, SubmitFailure};

/// Status of one question in the question map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStatus {
    Current,
    Answered,
    Unattempted,
}

/// Aggregated view of attempt progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamProgress {
    pub total: usize,
    pub answered: usize,
    pub unattempted: usize,
    /// One entry per snapshot question, in snapshot order.
    pub statuses: Vec<QuestionStatus>,
}

impl ExamProgress {
    #[must_use]
    pub fn from_session(session: &ExamSession) -> Self {
        let answers = session.answers();
        let statuses: Vec<_> = session
            .questions()
            .iter()
            .enumerate()
            .map(|(idx, question)| {
                if idx == session.current_index() {
                    QuestionStatus::Current
                } else if answers.is_answered(question.id()) {
                    QuestionStatus::Answered
                } else {
                    QuestionStatus::Unattempted
                }
            })
            .collect();

        let total = statuses.len();
        let answered = session
            .questions()
            .iter()
            .filter(|q| answers.is_answered(q.id()))
            .count();

        Self {
            total,
            answered,
            unattempted: total - answered,
            statuses,
        }
    }
}

/// Point-in-time copy of the engine state for renderers.
///
/// Presentation-agnostic: no formatted strings. Renderers format the clock
/// with `prep_core::time::format_clock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSnapshot {
    pub session_id: SessionId,
    pub category: ExamCategory,
    pub state: ExamState,
    pub current_index: usize,
    pub current_question: Option<Question>,
    pub remaining_seconds: u32,
    pub total_allotted_seconds: u32,
    pub answers: AnswerMap,
    pub progress: ExamProgress,
    pub result: Option<SubmissionResult>,
    /// Set while the attempt is open again after a failed submission.
    pub submit_failure: Option<SubmitFailure>,
}

impl ExamSnapshot {
    #[must_use]
    pub fn from_session(session: &ExamSession) -> Self {
        let config = session.config();
        Self {
            session_id: config.session_id(),
            category: config.category().clone(),
            state: session.state(),
            current_index: session.current_index(),
            current_question: session.current_question().cloned(),
            remaining_seconds: session.remaining_seconds(),
            total_allotted_seconds: session.countdown().total(),
            answers: session.answers().clone(),
            progress: ExamProgress::from_session(session),
            result: session.result().copied(),
            submit_failure: session.last_failure().cloned(),
        }
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.progress.total
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.state == ExamState::Submitted
    }
}
