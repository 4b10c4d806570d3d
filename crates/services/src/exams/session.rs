use std::fmt;

use prep_core::model::{
    AnswerMap, ExamConfig, OptionKey, Question, QuestionId, SubmissionResult,
};
use prep_core::scoring::{ScoredAttempt, score_attempt};
use prep_core::{Countdown, Tick};

use crate::error::InvalidOperation;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle of one timed attempt.
///
/// `Loading → Active → Submitting → Submitted`, with `Submitting → Active`
/// when persisting fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamState {
    Loading,
    Active,
    Submitting,
    Submitted,
}

impl ExamState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
        }
    }
}

impl fmt::Display for ExamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Timer,
}

impl SubmitTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Timer => "timer",
        }
    }
}

/// The last submission that failed and reopened the attempt.
///
/// Kept until the next submission starts, so a failed expiry submit stays
/// visible to whoever renders the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitFailure {
    pub trigger: SubmitTrigger,
    pub message: String,
    /// Whether submitting again may succeed.
    pub retryable: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory state of one exam attempt.
///
/// Pure and synchronous: no timers, no storage. `ExamSessionEngine` owns one
/// of these behind a lock and drives it.
#[derive(Clone)]
pub struct ExamSession {
    config: ExamConfig,
    state: ExamState,
    questions: Vec<Question>,
    answers: AnswerMap,
    current: usize,
    countdown: Countdown,
    result: Option<SubmissionResult>,
    last_failure: Option<SubmitFailure>,
}

impl ExamSession {
    #[must_use]
    pub fn new(config: ExamConfig) -> Self {
        let countdown = Countdown::new(config.total_allotted_seconds());
        Self {
            config,
            state: ExamState::Loading,
            questions: Vec::new(),
            answers: AnswerMap::new(),
            current: 0,
            countdown,
            result: None,
            last_failure: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExamConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ExamState {
        self.state
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.countdown.remaining()
    }

    /// Set once, when the attempt reaches `Submitted`.
    #[must_use]
    pub fn result(&self) -> Option<&SubmissionResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn last_failure(&self) -> Option<&SubmitFailure> {
        self.last_failure.as_ref()
    }

    /// Install the question snapshot and start the attempt.
    ///
    /// The snapshot is capped at the configured count and its order is fixed
    /// from here on. An empty snapshot still activates.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation::AlreadyLoaded` unless the session is `Loading`.
    pub fn activate(&mut self, mut questions: Vec<Question>) -> Result<(), InvalidOperation> {
        if self.state != ExamState::Loading {
            return Err(InvalidOperation::AlreadyLoaded);
        }
        let limit = usize::try_from(self.config.question_count()).unwrap_or(usize::MAX);
        questions.truncate(limit);

        self.questions = questions;
        self.answers = AnswerMap::new();
        self.current = 0;
        self.countdown = Countdown::new(self.config.total_allotted_seconds());
        self.state = ExamState::Active;
        Ok(())
    }

    /// Record (or overwrite) the answer for a question in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when not `Active` or when the question is
    /// not part of the snapshot. Nothing changes in either case.
    pub fn select_option(
        &mut self,
        question_id: &QuestionId,
        key: OptionKey,
    ) -> Result<(), InvalidOperation> {
        self.ensure_active()?;
        if !self.questions.iter().any(|q| q.id() == question_id) {
            return Err(InvalidOperation::UnknownQuestion(question_id.clone()));
        }
        self.answers.record(question_id.clone(), key);
        Ok(())
    }

    /// Move to `index`, clamped into the snapshot. Returns the resulting index.
    ///
    /// Outside `Active`, or with an empty snapshot, the index is left alone.
    pub fn navigate(&mut self, index: usize) -> usize {
        if self.state == ExamState::Active && !self.questions.is_empty() {
            self.current = index.min(self.questions.len() - 1);
        }
        self.current
    }

    /// One second of countdown. Only `Active` sessions tick.
    pub fn tick(&mut self) -> Tick {
        if self.state != ExamState::Active {
            return Tick::Idle;
        }
        self.countdown.tick()
    }

    /// Claim the submission and score the attempt as of now.
    ///
    /// Returns `None` when the session is not `Active`; only one caller can
    /// hold the claim at a time.
    pub fn begin_submit(&mut self) -> Option<ScoredAttempt> {
        if self.state != ExamState::Active {
            return None;
        }
        self.state = ExamState::Submitting;
        self.last_failure = None;
        Some(score_attempt(
            self.config.session_id(),
            &self.questions,
            &self.answers,
            &self.countdown,
        ))
    }

    /// Persisting succeeded; the result is final.
    pub(crate) fn finish_submit(&mut self, result: SubmissionResult) {
        if self.state == ExamState::Submitting {
            self.state = ExamState::Submitted;
            self.result = Some(result);
        }
    }

    /// Persisting failed; reopen the attempt so it can be retried.
    pub(crate) fn rollback_submit(&mut self, failure: SubmitFailure) {
        if self.state == ExamState::Submitting {
            self.state = ExamState::Active;
            self.last_failure = Some(failure);
        }
    }

    fn ensure_active(&self) -> Result<(), InvalidOperation> {
        if self.state == ExamState::Active {
            Ok(())
        } else {
            Err(InvalidOperation::NotActive(self.state))
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("session_id", &self.config.session_id())
            .field("state", &self.state)
            .field("questions_len", &self.questions.len())
            .field("answers_len", &self.answers.len())
            .field("current", &self.current)
            .field("countdown", &self.countdown)
            .field("last_failure", &self.last_failure)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{AnswerChoice, ExamCategory, SessionId};

    fn question(id: usize, correct: OptionKey) -> Question {
        Question::new(
            QuestionId::new(format!("q{id}")).unwrap(),
            format!("Question {id}"),
            ["a".into(), "b".into(), "c".into(), "d".into()],
            correct,
            None,
        )
        .unwrap()
    }

    fn session(count: u32) -> ExamSession {
        ExamSession::new(ExamConfig::new(
            ExamCategory::new("CPA").unwrap(),
            count,
            SessionId::random(),
        ))
    }

    fn active(count: u32, loaded: usize) -> ExamSession {
        let mut session = session(count);
        session
            .activate((0..loaded).map(|i| question(i, OptionKey::C)).collect())
            .unwrap();
        session
    }

    #[test]
    fn starts_loading_with_full_clock() {
        let session = session(4);
        assert_eq!(session.state(), ExamState::Loading);
        assert_eq!(session.remaining_seconds(), 360);
        assert!(session.result().is_none());
    }

    #[test]
    fn activate_caps_snapshot_and_rejects_second_load() {
        let mut session = active(2, 5);
        assert_eq!(session.state(), ExamState::Active);
        assert_eq!(session.questions().len(), 2);

        let err = session.activate(vec![question(9, OptionKey::A)]).unwrap_err();
        assert_eq!(err, InvalidOperation::AlreadyLoaded);
        assert_eq!(session.questions().len(), 2);
    }

    #[test]
    fn select_option_overwrites_and_rejects_unknown() {
        let mut session = active(3, 3);
        let id = session.questions()[1].id().clone();

        session.select_option(&id, OptionKey::A).unwrap();
        session.select_option(&id, OptionKey::D).unwrap();
        assert_eq!(session.answers().get(&id), Some(OptionKey::D));
        assert_eq!(session.answers().len(), 1);

        let stranger = QuestionId::new("nope").unwrap();
        let err = session.select_option(&stranger, OptionKey::A).unwrap_err();
        assert_eq!(err, InvalidOperation::UnknownQuestion(stranger));
        assert_eq!(session.answers().len(), 1);
    }

    #[test]
    fn select_option_requires_active() {
        let mut session = session(2);
        let id = QuestionId::new("q0").unwrap();
        let err = session.select_option(&id, OptionKey::A).unwrap_err();
        assert_eq!(err, InvalidOperation::NotActive(ExamState::Loading));
    }

    #[test]
    fn navigate_clamps_into_snapshot() {
        let mut session = active(5, 5);
        assert_eq!(session.navigate(3), 3);
        assert_eq!(session.navigate(42), 4);
        assert_eq!(session.navigate(0), 0);
    }

    #[test]
    fn navigate_is_noop_for_empty_or_inactive() {
        let mut empty = active(3, 0);
        assert_eq!(empty.navigate(2), 0);
        assert!(empty.current_question().is_none());

        let mut loading = session(3);
        assert_eq!(loading.navigate(1), 0);
    }

    #[test]
    fn tick_only_runs_while_active() {
        let mut loading = session(1);
        assert_eq!(loading.tick(), Tick::Idle);
        assert_eq!(loading.remaining_seconds(), 90);

        let mut session = active(1, 1);
        assert_eq!(session.tick(), Tick::Running(89));
        session.begin_submit().unwrap();
        assert_eq!(session.tick(), Tick::Idle);
        assert_eq!(session.remaining_seconds(), 89);
    }

    #[test]
    fn begin_submit_is_single_flight() {
        let mut session = active(2, 2);
        let id = session.questions()[0].id().clone();
        session.select_option(&id, OptionKey::C).unwrap();

        let attempt = session.begin_submit().unwrap();
        assert_eq!(session.state(), ExamState::Submitting);
        assert!(session.begin_submit().is_none());
        assert_eq!(attempt.result.correct_count, 1);
        assert_eq!(attempt.answers[1].choice, AnswerChoice::Unattempted);

        session.finish_submit(attempt.result);
        assert_eq!(session.state(), ExamState::Submitted);
        assert_eq!(session.result(), Some(&attempt.result));
        assert!(session.begin_submit().is_none());
    }

    #[test]
    fn rollback_reopens_and_rescoring_uses_later_time() {
        let mut session = active(2, 2);
        for _ in 0..10 {
            session.tick();
        }
        let first = session.begin_submit().unwrap();
        session.rollback_submit(SubmitFailure {
            trigger: SubmitTrigger::Manual,
            message: "connection reset".into(),
            retryable: true,
        });
        assert_eq!(session.state(), ExamState::Active);
        assert!(session.result().is_none());
        assert_eq!(
            session.last_failure().map(|f| f.trigger),
            Some(SubmitTrigger::Manual)
        );

        for _ in 0..5 {
            session.tick();
        }
        let second = session.begin_submit().unwrap();
        assert!(session.last_failure().is_none());
        assert_eq!(first.result.time_spent_seconds, 10);
        assert_eq!(second.result.time_spent_seconds, 15);
    }

    #[test]
    fn rejects_after_submission() {
        let mut session = active(1, 1);
        let id = session.questions()[0].id().clone();
        let attempt = session.begin_submit().unwrap();
        session.finish_submit(attempt.result);

        let err = session.select_option(&id, OptionKey::B).unwrap_err();
        assert_eq!(err, InvalidOperation::NotActive(ExamState::Submitted));
        assert!(session.answers().is_empty());
    }
}
