use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use rand::rng;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use prep_core::model::{
    ExamConfig, ExamSummary, OptionKey, QuestionId, SessionId, SubmissionResult,
};
use prep_core::scoring::ScoredAttempt;
use prep_core::{Clock, Tick};
use storage::repository::{QuestionSource, ResultStore, StorageError};

use super::session::{ExamSession, ExamState, SubmitFailure, SubmitTrigger};
use super::view::ExamSnapshot;
use crate::error::{ExamError, InvalidOperation};

const TICK_PERIOD: Duration = Duration::from_secs(1);

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    persist_timeout: Duration,
    shuffle: bool,
}

impl EngineSettings {
    pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Upper bound on one persist attempt (identity lookup plus writes).
    #[must_use]
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    /// Shuffle the snapshot once at load time.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn persist_timeout(&self) -> Duration {
        self.persist_timeout
    }

    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            persist_timeout: Self::DEFAULT_PERSIST_TIMEOUT,
            shuffle: false,
        }
    }
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// What a call to `submit` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// This call scored and persisted the attempt.
    Submitted(SubmissionResult),
    /// Another submission is persisting right now; nothing was done.
    InFlight,
    /// The attempt was already submitted; nothing was done.
    AlreadySubmitted(SubmissionResult),
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

struct Inner {
    session: Mutex<ExamSession>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    questions: Arc<dyn QuestionSource>,
    results: Arc<dyn ResultStore>,
    clock: Clock,
    settings: EngineSettings,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let handle = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Owns the lifecycle of one timed-exam attempt.
///
/// Cheap to clone; clones share the same attempt. While the attempt is
/// `Active` a background task ticks the countdown once per second and
/// submits when it reaches zero. Manual and timer submissions go through the
/// same claim on the session, so at most one persist runs at a time and a
/// submitted attempt is never persisted again.
///
/// Must be loaded from within a Tokio runtime.
#[derive(Clone)]
pub struct ExamSessionEngine {
    inner: Arc<Inner>,
}

impl ExamSessionEngine {
    #[must_use]
    pub fn new(
        config: ExamConfig,
        questions: Arc<dyn QuestionSource>,
        results: Arc<dyn ResultStore>,
        clock: Clock,
    ) -> Self {
        Self::with_settings(config, questions, results, clock, EngineSettings::default())
    }

    #[must_use]
    pub fn with_settings(
        config: ExamConfig,
        questions: Arc<dyn QuestionSource>,
        results: Arc<dyn ResultStore>,
        clock: Clock,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(ExamSession::new(config)),
                ticker: Mutex::new(None),
                questions,
                results,
                clock,
                settings,
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> EngineSettings {
        self.inner.settings
    }

    #[must_use]
    pub fn state(&self) -> ExamState {
        self.session().state()
    }

    #[must_use]
    pub fn snapshot(&self) -> ExamSnapshot {
        ExamSnapshot::from_session(&self.session())
    }

    /// Fetch the question snapshot, activate the attempt and start the clock.
    ///
    /// A fetch failure leaves the attempt `Loading`; the caller decides
    /// whether to try again.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Fetch` if the question source fails and
    /// `InvalidOperation::AlreadyLoaded` if the attempt is past `Loading`.
    pub async fn load(&self) -> Result<(), ExamError> {
        let config = {
            let session = self.session();
            if session.state() != ExamState::Loading {
                return Err(InvalidOperation::AlreadyLoaded.into());
            }
            session.config().clone()
        };

        let mut questions = self
            .inner
            .questions
            .fetch_questions(config.category(), config.question_count())
            .await
            .map_err(|err| {
                warn!(
                    session_id = %config.session_id(),
                    category = %config.category(),
                    error = %err,
                    "failed to fetch exam questions"
                );
                ExamError::Fetch(err)
            })?;

        if self.inner.settings.shuffle {
            questions.shuffle(&mut rng());
        }

        let (loaded, total_seconds) = {
            let mut session = self.session();
            session.activate(questions)?;
            (session.questions().len(), session.countdown().total())
        };

        info!(
            session_id = %config.session_id(),
            category = %config.category(),
            requested = config.question_count(),
            loaded,
            total_seconds,
            "exam started"
        );

        self.start_ticker();
        Ok(())
    }

    /// Record the answer for a question.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidOperation` when the attempt is not `Active`
    /// or the question is not in the snapshot; nothing changes.
    pub fn select_option(&self, question_id: &QuestionId, key: OptionKey) -> Result<(), ExamError> {
        self.session().select_option(question_id, key)?;
        debug!(question_id = %question_id, key = %key, "answer recorded");
        Ok(())
    }

    /// Move to a question, clamped into the snapshot. Returns the resulting index.
    pub fn navigate(&self, index: usize) -> usize {
        self.session().navigate(index)
    }

    /// One second of countdown, driven only by the background ticker. When
    /// the countdown reaches zero the attempt is submitted before this returns.
    async fn tick(&self) -> Result<Tick, ExamError> {
        let (tick, claimed) = {
            let mut session = self.session();
            let tick = session.tick();
            let claimed = if tick == Tick::Expired {
                session.begin_submit()
            } else {
                None
            };
            (tick, claimed)
        };

        if let Some(attempt) = claimed {
            info!(session_id = %self.session_id(), "time expired, submitting");
            // The ticker may be the caller; let it finish on its own.
            self.detach_ticker();
            self.persist_claimed(attempt, SubmitTrigger::Timer).await?;
        }
        Ok(tick)
    }

    /// Score and persist the attempt.
    ///
    /// Only one submission can be in flight; concurrent or repeated calls
    /// are no-ops reported through `SubmitOutcome`. On failure the attempt
    /// goes back to `Active` and a later call scores it again. Failures of
    /// the expiry-triggered submit are reported through
    /// `ExamSnapshot::submit_failure`.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::NotAuthenticated`, `ExamError::Persist` or
    /// `ExamError::PersistTimeout` when persisting fails, and
    /// `InvalidOperation::NotActive` before the attempt is loaded.
    pub async fn submit(&self) -> Result<SubmitOutcome, ExamError> {
        let claimed = {
            let mut session = self.session();
            match session.state() {
                ExamState::Loading => {
                    return Err(InvalidOperation::NotActive(ExamState::Loading).into());
                }
                ExamState::Submitting => return Ok(SubmitOutcome::InFlight),
                ExamState::Submitted => {
                    return Ok(session
                        .result()
                        .copied()
                        .map_or(SubmitOutcome::InFlight, SubmitOutcome::AlreadySubmitted));
                }
                ExamState::Active => session.begin_submit(),
            }
        };
        let Some(attempt) = claimed else {
            return Ok(SubmitOutcome::InFlight);
        };

        self.stop_ticker();
        let result = self.persist_claimed(attempt, SubmitTrigger::Manual).await?;
        Ok(SubmitOutcome::Submitted(result))
    }

    async fn persist_claimed(
        &self,
        attempt: ScoredAttempt,
        trigger: SubmitTrigger,
    ) -> Result<SubmissionResult, ExamError> {
        let session_id = self.session_id();
        let timeout = self.inner.settings.persist_timeout;

        let outcome = match time::timeout(timeout, self.write_attempt(&attempt)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExamError::PersistTimeout(timeout)),
        };

        match outcome {
            Ok(()) => {
                self.session().finish_submit(attempt.result);
                info!(
                    session_id = %session_id,
                    trigger = trigger.as_str(),
                    correct = attempt.result.correct_count,
                    total = attempt.result.total_questions,
                    percentage = attempt.result.percentage,
                    time_spent_seconds = attempt.result.time_spent_seconds,
                    "exam submitted"
                );
                Ok(attempt.result)
            }
            Err(err) => {
                let failure = SubmitFailure {
                    trigger,
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                };
                let remaining = {
                    let mut session = self.session();
                    session.rollback_submit(failure);
                    session.remaining_seconds()
                };
                warn!(
                    session_id = %session_id,
                    trigger = trigger.as_str(),
                    remaining,
                    error = %err,
                    "submission failed, attempt reopened"
                );
                if remaining > 0 {
                    self.start_ticker();
                }
                Err(err)
            }
        }
    }

    async fn write_attempt(&self, attempt: &ScoredAttempt) -> Result<(), ExamError> {
        let results = &self.inner.results;
        let user_id = results
            .current_identity()
            .await
            .map_err(persist_error)?
            .ok_or(ExamError::NotAuthenticated)?;

        let config = self.session().config().clone();
        let summary =
            ExamSummary::from_result(&config, user_id, attempt.result, self.inner.clock.now());
        results
            .persist_submission(&summary, &attempt.answers)
            .await
            .map_err(persist_error)
    }

    //
    // ─── TICKER ────────────────────────────────────────────────────────────
    //

    fn start_ticker(&self) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(run_ticker(weak, Instant::now() + TICK_PERIOD));
        if let Some(previous) = self.ticker().replace(handle) {
            previous.abort();
        }
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self.ticker().take() {
            handle.abort();
        }
    }

    fn detach_ticker(&self) {
        drop(self.ticker().take());
    }

    fn session(&self) -> MutexGuard<'_, ExamSession> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn session_id(&self) -> SessionId {
        self.session().config().session_id()
    }
}

async fn run_ticker(inner: Weak<Inner>, first_tick: Instant) {
    let mut interval = time::interval_at(first_tick, TICK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let engine = ExamSessionEngine { inner };
        match engine.tick().await {
            Ok(Tick::Running(remaining)) => {
                debug!(remaining, "tick");
            }
            Ok(Tick::Expired | Tick::Idle) => return,
            Err(err) => {
                // Recorded on the session; the snapshot carries it to the caller.
                debug!(error = %err, "ticker stopped after failed submission");
                return;
            }
        }
    }
}

fn persist_error(err: StorageError) -> ExamError {
    match err {
        StorageError::Unauthorized => ExamError::NotAuthenticated,
        other => ExamError::Persist(other),
    }
}

impl std::fmt::Debug for ExamSessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExamSessionEngine")
            .field("session", &*self.session())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
