use crate::countdown::Countdown;
use crate::model::{AnswerMap, AnswerRecord, Question, SessionId, SubmissionResult};

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Rounded share of `correct` over `total`, in `0..=100`.
///
/// An empty exam scores 0; `correct` above `total` is capped at 100.
#[must_use]
pub fn percentage(correct: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let correct = u64::from(correct.min(total));
    let total = u64::from(total);
    // Round half up in integer arithmetic.
    let pct = (correct * 200 + total) / (total * 2);
    u8::try_from(pct).unwrap_or(100)
}

//
// ─── SCORED ATTEMPT ────────────────────────────────────────────────────────────
//

/// Result plus the per-question rows that produced it.
///
/// Both halves come from the same pass, so what gets persisted is exactly
/// what was scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredAttempt {
    pub result: SubmissionResult,
    pub answers: Vec<AnswerRecord>,
}

/// Score every question in the snapshot against the current answers.
#[must_use]
pub fn score_attempt(
    session_id: SessionId,
    questions: &[Question],
    answers: &AnswerMap,
    countdown: &Countdown,
) -> ScoredAttempt {
    let mut correct_count = 0_u32;
    let mut answered_count = 0_u32;
    let mut rows = Vec::with_capacity(questions.len());

    for question in questions {
        let choice = answers.choice_for(question.id());
        let is_correct = question.is_correct(choice);
        if choice.is_attempted() {
            answered_count = answered_count.saturating_add(1);
        }
        if is_correct {
            correct_count = correct_count.saturating_add(1);
        }
        rows.push(AnswerRecord {
            session_id,
            question_id: question.id().clone(),
            choice,
            is_correct,
        });
    }

    let total_questions = u32::try_from(questions.len()).unwrap_or(u32::MAX);

    ScoredAttempt {
        result: SubmissionResult {
            total_questions,
            correct_count,
            answered_count,
            unanswered_count: total_questions - answered_count,
            percentage: percentage(correct_count, total_questions),
            time_spent_seconds: countdown.elapsed(),
            total_allotted_seconds: countdown.total(),
        },
        answers: rows,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
