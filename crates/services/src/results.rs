use chrono::{DateTime, Days, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

use prep_core::model::{
    AnswerChoice, ExamCategory, ExamSummary, OptionKey, Question, QuestionId, SessionId, UserId,
};
use prep_core::Clock;
use prep_core::scoring::percentage;
use storage::repository::{QuestionSource, ResultReader, ResultStore};

use crate::error::ResultsError;

/// Upper bound on summaries read when aggregating user statistics.
const STATS_WINDOW: u32 = 1_000;

//
// ─── RESULT VIEW ───────────────────────────────────────────────────────────────
//

/// Presentation-agnostic result of one submitted attempt.
///
/// Times are raw seconds; the UI formats them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamResultView {
    pub session_id: SessionId,
    pub category: ExamCategory,
    pub submitted_at: DateTime<Utc>,

    pub score: u32,
    pub total_questions: u32,
    pub percentage: u8,
    pub answered: u32,
    pub unanswered: u32,
    pub time_taken_seconds: u32,
    pub time_given_seconds: u32,
}

impl ExamResultView {
    #[must_use]
    pub fn from_summary(summary: &ExamSummary) -> Self {
        let result = summary.result();
        Self {
            session_id: summary.session_id(),
            category: summary.category().clone(),
            submitted_at: summary.submitted_at(),
            score: result.correct_count,
            total_questions: result.total_questions,
            percentage: result.percentage,
            answered: result.answered_count,
            unanswered: result.unanswered_count,
            time_taken_seconds: result.time_spent_seconds,
            time_given_seconds: result.total_allotted_seconds,
        }
    }
}

//
// ─── ANSWER REVIEW ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Correct,
    Incorrect,
    Unanswered,
}

/// One answered (or skipped) question joined with its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub question_id: QuestionId,
    pub text: String,
    pub options: [String; 4],
    pub user_choice: AnswerChoice,
    pub correct_key: OptionKey,
    pub status: ReviewStatus,
    pub explanation: Option<String>,
}

impl ReviewItem {
    #[must_use]
    pub fn new(question: &Question, user_choice: AnswerChoice) -> Self {
        let status = match user_choice {
            AnswerChoice::Unattempted => ReviewStatus::Unanswered,
            choice if question.is_correct(choice) => ReviewStatus::Correct,
            AnswerChoice::Chosen(_) => ReviewStatus::Incorrect,
        };
        Self {
            question_id: question.id().clone(),
            text: question.text().to_owned(),
            options: question.options().clone(),
            user_choice,
            correct_key: question.correct_key(),
            status,
            explanation: question.explanation().map(str::to_owned),
        }
    }
}

//
// ─── USER STATS ────────────────────────────────────────────────────────────────
//

/// Lifetime totals for one user, plus recent activity.
///
/// Days are UTC calendar days of `submitted_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserStats {
    pub total_answered: u32,
    pub total_correct: u32,
    /// Rounded share of correct answers among answered ones; 0 when none.
    pub accuracy: u8,
    pub sessions: u32,
    /// Consecutive days with a submission, counting back from today.
    /// 0 when nothing was submitted today.
    pub study_streak: u32,
    /// Questions answered in attempts submitted today.
    pub today_count: u32,
}

impl UserStats {
    #[must_use]
    pub fn from_summaries(summaries: &[ExamSummary], today: NaiveDate) -> Self {
        let (answered, correct) = summaries.iter().fold((0_u32, 0_u32), |(a, c), s| {
            let r = s.result();
            (
                a.saturating_add(r.answered_count),
                c.saturating_add(r.correct_count),
            )
        });
        let today_count = summaries
            .iter()
            .filter(|s| s.submitted_at().date_naive() == today)
            .fold(0_u32, |n, s| n.saturating_add(s.result().answered_count));

        Self {
            total_answered: answered,
            total_correct: correct,
            accuracy: percentage(correct, answered),
            sessions: u32::try_from(summaries.len()).unwrap_or(u32::MAX),
            study_streak: study_streak(summaries, today),
            today_count,
        }
    }
}

fn study_streak(summaries: &[ExamSummary], today: NaiveDate) -> u32 {
    let active: BTreeSet<NaiveDate> = summaries
        .iter()
        .map(|s| s.submitted_at().date_naive())
        .collect();

    let mut streak = 0_u32;
    let mut day = today;
    while active.contains(&day) {
        streak += 1;
        match day.checked_sub_days(Days::new(1)) {
            Some(previous) => day = previous,
            None => break,
        }
    }
    streak
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Read side of submitted attempts: results, answer review and statistics.
#[derive(Clone)]
pub struct ResultsService {
    clock: Clock,
    questions: Arc<dyn QuestionSource>,
    results: Arc<dyn ResultStore>,
    history: Arc<dyn ResultReader>,
}

impl ResultsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionSource>,
        results: Arc<dyn ResultStore>,
        history: Arc<dyn ResultReader>,
    ) -> Self {
        Self {
            clock,
            questions,
            results,
            history,
        }
    }

    /// Load the result of a submitted attempt.
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::Storage` (including `NotFound`) on repository failures.
    pub async fn result(&self, session_id: SessionId) -> Result<ExamResultView, ResultsError> {
        let summary = self.history.get_summary(session_id).await?;
        Ok(ExamResultView::from_summary(&summary))
    }

    /// Every answer row of an attempt joined with its question, in answer order.
    ///
    /// Rows whose question no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::Storage` on repository failures.
    pub async fn review(&self, session_id: SessionId) -> Result<Vec<ReviewItem>, ResultsError> {
        let answers = self.history.list_answers(session_id).await?;
        let ids: Vec<_> = answers.iter().map(|a| a.question_id.clone()).collect();
        let questions: HashMap<_, _> = self
            .questions
            .get_questions(&ids)
            .await?
            .into_iter()
            .map(|q| (q.id().clone(), q))
            .collect();

        let mut items = Vec::with_capacity(answers.len());
        for answer in &answers {
            match questions.get(&answer.question_id) {
                Some(question) => items.push(ReviewItem::new(question, answer.choice)),
                None => warn!(
                    session_id = %session_id,
                    question_id = %answer.question_id,
                    "answered question is missing from the question source"
                ),
            }
        }
        Ok(items)
    }

    /// Most recent results for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::Storage` on repository failures.
    pub async fn recent_results(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ExamResultView>, ResultsError> {
        let summaries = self.history.list_summaries(user_id, limit).await?;
        Ok(summaries.iter().map(ExamResultView::from_summary).collect())
    }

    /// Aggregate statistics for a user, with streak and today's count taken
    /// against the service clock.
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::Storage` on repository failures.
    pub async fn user_stats(&self, user_id: UserId) -> Result<UserStats, ResultsError> {
        let summaries = self.history.list_summaries(user_id, STATS_WINDOW).await?;
        Ok(UserStats::from_summaries(
            &summaries,
            self.clock.now().date_naive(),
        ))
    }

    /// Statistics for whoever is signed in.
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::NotAuthenticated` when nobody is signed in.
    pub async fn current_user_stats(&self) -> Result<UserStats, ResultsError> {
        let user_id = self
            .results
            .current_identity()
            .await?
            .ok_or(ResultsError::NotAuthenticated)?;
        self.user_stats(user_id).await
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
