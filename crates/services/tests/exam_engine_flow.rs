use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use prep_core::model::{
    AnswerChoice, AnswerRecord, ExamCategory, ExamConfig, ExamSummary, OptionKey, Question,
    QuestionId, SessionId, UserId,
};
use prep_core::time::fixed_clock;
use services::{
    EngineSettings, ExamError, ExamSessionEngine, ExamState, InvalidOperation, SubmitOutcome,
    SubmitTrigger,
};
use storage::repository::{
    InMemoryRepository, QuestionRecord, ResultReader, ResultStore, StorageError,
};
use tokio::time;
use uuid::Uuid;

//
// ─── FIXTURES ──────────────────────────────────────────────────────────────────
//

fn cpa() -> ExamCategory {
    ExamCategory::new("CPA").unwrap()
}

fn question(i: usize, correct: OptionKey) -> Question {
    Question::new(
        QuestionId::new(format!("q{i:02}")).unwrap(),
        format!("Question {i}"),
        ["a".into(), "b".into(), "c".into(), "d".into()],
        correct,
        None,
    )
    .unwrap()
}

fn signed_in_repo(questions: usize) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    for i in 0..questions {
        repo.upsert_question(&cpa(), question(i, OptionKey::C)).unwrap();
    }
    repo.set_identity(Some(UserId::new(Uuid::new_v4()))).unwrap();
    repo
}

fn engine(
    repo: &InMemoryRepository,
    results: Arc<dyn ResultStore>,
    count: u32,
    settings: EngineSettings,
) -> ExamSessionEngine {
    let config = ExamConfig::new(cpa(), count, SessionId::random());
    ExamSessionEngine::with_settings(config, Arc::new(repo.clone()), results, fixed_clock(), settings)
}

/// Fails the first `failures` persists, then delegates.
#[derive(Clone)]
struct FlakyStore {
    inner: InMemoryRepository,
    failures: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl FlakyStore {
    fn new(inner: InMemoryRepository, failures: usize) -> Self {
        Self {
            inner,
            failures: Arc::new(AtomicUsize::new(failures)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ResultStore for FlakyStore {
    async fn current_identity(&self) -> Result<Option<UserId>, StorageError> {
        self.inner.current_identity().await
    }

    async fn persist_submission(
        &self,
        summary: &ExamSummary,
        answers: &[AnswerRecord],
    ) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(StorageError::Connection("connection reset".into()));
        }
        self.inner.persist_submission(summary, answers).await
    }
}

/// Sleeps before delegating while `slow` is set.
#[derive(Clone)]
struct SlowStore {
    inner: InMemoryRepository,
    delay: Duration,
    slow: Arc<AtomicBool>,
}

#[async_trait]
impl ResultStore for SlowStore {
    async fn current_identity(&self) -> Result<Option<UserId>, StorageError> {
        self.inner.current_identity().await
    }

    async fn persist_submission(
        &self,
        summary: &ExamSummary,
        answers: &[AnswerRecord],
    ) -> Result<(), StorageError> {
        if self.slow.load(Ordering::SeqCst) {
            time::sleep(self.delay).await;
        }
        self.inner.persist_submission(summary, answers).await
    }
}

//
// ─── SCENARIOS ─────────────────────────────────────────────────────────────────
//

#[tokio::test(start_paused = true)]
async fn twenty_questions_twelve_correct_after_twenty_minutes() {
    let repo = signed_in_repo(20);
    let engine = engine(&repo, Arc::new(repo.clone()), 20, EngineSettings::default());
    engine.load().await.unwrap();
    assert_eq!(engine.snapshot().remaining_seconds, 1800);

    let ids: Vec<_> = (0..20)
        .map(|i| QuestionId::new(format!("q{i:02}")).unwrap())
        .collect();
    for (i, id) in ids.iter().take(15).enumerate() {
        let key = if i < 12 { OptionKey::C } else { OptionKey::A };
        engine.select_option(id, key).unwrap();
    }

    time::sleep(Duration::from_millis(1_200_500)).await;
    assert_eq!(engine.snapshot().remaining_seconds, 600);

    let outcome = engine.submit().await.unwrap();
    let SubmitOutcome::Submitted(result) = outcome else {
        panic!("expected a submission, got {outcome:?}");
    };
    assert_eq!(result.total_questions, 20);
    assert_eq!(result.answered_count, 15);
    assert_eq!(result.unanswered_count, 5);
    assert_eq!(result.correct_count, 12);
    assert_eq!(result.percentage, 60);
    assert_eq!(result.time_spent_seconds, 1200);
    assert_eq!(result.total_allotted_seconds, 1800);

    let session_id = engine.snapshot().session_id;
    let rows = repo.list_answers(session_id).await.unwrap();
    assert_eq!(rows.len(), 20);
    assert_eq!(
        rows.iter()
            .filter(|r| r.choice == AnswerChoice::Unattempted)
            .count(),
        5
    );
    assert_eq!(repo.summary_count(session_id).unwrap(), 1);

    // The clock no longer moves once submitted.
    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.snapshot().remaining_seconds, 600);
}

#[tokio::test(start_paused = true)]
async fn zero_questions_still_submits() {
    let repo = signed_in_repo(0);
    let engine = engine(&repo, Arc::new(repo.clone()), 5, EngineSettings::default());
    engine.load().await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, ExamState::Active);
    assert_eq!(snapshot.question_count(), 0);
    assert_eq!(engine.navigate(3), 0);

    let SubmitOutcome::Submitted(result) = engine.submit().await.unwrap() else {
        panic!("expected a submission");
    };
    assert_eq!(result.total_questions, 0);
    assert_eq!(result.answered_count, 0);
    assert_eq!(result.unanswered_count, 0);
    assert_eq!(result.percentage, 0);
}

#[tokio::test(start_paused = true)]
async fn decorated_correct_keys_are_normalized() {
    let repo = InMemoryRepository::new();
    repo.set_identity(Some(UserId::new(Uuid::new_v4()))).unwrap();
    let legacy = QuestionRecord {
        id: "legacy".into(),
        category: "CPA".into(),
        text: "Pick C".into(),
        options: ["a".into(), "b".into(), "c".into(), "d".into()],
        correct_option: None,
        correct_answer: Some("(C)".into()),
        explanation: None,
    }
    .into_question()
    .unwrap();
    repo.upsert_question(&cpa(), legacy).unwrap();

    let engine = engine(&repo, Arc::new(repo.clone()), 1, EngineSettings::default());
    engine.load().await.unwrap();
    engine
        .select_option(&QuestionId::new("legacy").unwrap(), OptionKey::parse("c").unwrap())
        .unwrap();

    let SubmitOutcome::Submitted(result) = engine.submit().await.unwrap() else {
        panic!("expected a submission");
    };
    assert_eq!(result.correct_count, 1);
    assert_eq!(result.percentage, 100);
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_submits_once_despite_concurrent_click() {
    let repo = signed_in_repo(1);
    let store = SlowStore {
        inner: repo.clone(),
        delay: Duration::from_secs(2),
        slow: Arc::new(AtomicBool::new(true)),
    };
    let engine = engine(&repo, Arc::new(store), 1, EngineSettings::default());
    engine.load().await.unwrap();

    // Expiry at 90s; the timer's persist is still running at 90.5s.
    time::sleep(Duration::from_millis(90_500)).await;
    assert_eq!(engine.state(), ExamState::Submitting);
    assert_eq!(engine.snapshot().remaining_seconds, 0);
    assert_eq!(engine.submit().await.unwrap(), SubmitOutcome::InFlight);

    time::sleep(Duration::from_secs(3)).await;
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, ExamState::Submitted);
    let result = snapshot.result.unwrap();
    assert_eq!(result.time_spent_seconds, 90);
    assert_eq!(repo.summary_count(snapshot.session_id).unwrap(), 1);

    assert_eq!(
        engine.submit().await.unwrap(),
        SubmitOutcome::AlreadySubmitted(result)
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_manual_submits_persist_once() {
    let repo = signed_in_repo(3);
    let store = SlowStore {
        inner: repo.clone(),
        delay: Duration::from_millis(500),
        slow: Arc::new(AtomicBool::new(true)),
    };
    let engine = engine(&repo, Arc::new(store), 3, EngineSettings::default());
    engine.load().await.unwrap();

    let (first, second) = tokio::join!(engine.submit(), engine.submit());
    let outcomes = [first.unwrap(), second.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::Submitted(_)))
            .count(),
        1
    );
    assert!(outcomes.contains(&SubmitOutcome::InFlight));
    assert_eq!(repo.summary_count(engine.snapshot().session_id).unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_persist_reopens_and_retry_scores_later_time() {
    let repo = signed_in_repo(10);
    let store = FlakyStore::new(repo.clone(), 1);
    let engine = engine(&repo, Arc::new(store.clone()), 10, EngineSettings::default());
    engine.load().await.unwrap();
    engine
        .select_option(&QuestionId::new("q00").unwrap(), OptionKey::C)
        .unwrap();

    time::sleep(Duration::from_millis(100_500)).await;
    let err = engine.submit().await.unwrap_err();
    assert!(matches!(err, ExamError::Persist(StorageError::Connection(_))));
    assert!(err.is_retryable());

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, ExamState::Active);
    assert!(snapshot.result.is_none());
    assert_eq!(snapshot.remaining_seconds, 800);
    assert_eq!(repo.summary_count(snapshot.session_id).unwrap(), 0);

    // The clock restarts with the reopened attempt.
    time::sleep(Duration::from_millis(50_200)).await;
    assert_eq!(engine.snapshot().remaining_seconds, 750);

    let SubmitOutcome::Submitted(result) = engine.submit().await.unwrap() else {
        panic!("expected a submission");
    };
    assert_eq!(result.time_spent_seconds, 150);
    assert_eq!(result.correct_count, 1);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(repo.summary_count(snapshot.session_id).unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_timer_submit_waits_for_manual_retry() {
    let repo = signed_in_repo(1);
    let store = FlakyStore::new(repo.clone(), 1);
    let engine = engine(&repo, Arc::new(store), 1, EngineSettings::default());
    engine.load().await.unwrap();

    time::sleep(Duration::from_secs(95)).await;
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, ExamState::Active);
    assert_eq!(snapshot.remaining_seconds, 0);
    assert_eq!(repo.summary_count(snapshot.session_id).unwrap(), 0);
    let failure = snapshot.submit_failure.expect("expiry failure is visible");
    assert_eq!(failure.trigger, SubmitTrigger::Timer);
    assert!(failure.retryable);
    assert!(failure.message.contains("connection reset"));

    let SubmitOutcome::Submitted(result) = engine.submit().await.unwrap() else {
        panic!("expected a submission");
    };
    assert_eq!(result.time_spent_seconds, 90);
    assert!(engine.snapshot().submit_failure.is_none());
}

/// Stores the summary, then fails the answer batch once.
#[derive(Clone)]
struct PartialWriteStore {
    inner: InMemoryRepository,
    answer_failures: Arc<AtomicUsize>,
}

#[async_trait]
impl ResultStore for PartialWriteStore {
    async fn current_identity(&self) -> Result<Option<UserId>, StorageError> {
        self.inner.current_identity().await
    }

    async fn persist_submission(
        &self,
        summary: &ExamSummary,
        answers: &[AnswerRecord],
    ) -> Result<(), StorageError> {
        if self.answer_failures.load(Ordering::SeqCst) > 0 {
            self.answer_failures.fetch_sub(1, Ordering::SeqCst);
            self.inner.persist_submission(summary, &[]).await?;
            return Err(StorageError::Http(503));
        }
        self.inner.persist_submission(summary, answers).await
    }
}

#[tokio::test(start_paused = true)]
async fn retry_after_partial_write_completes_the_submission() {
    let repo = signed_in_repo(3);
    let store = PartialWriteStore {
        inner: repo.clone(),
        answer_failures: Arc::new(AtomicUsize::new(1)),
    };
    let engine = engine(&repo, Arc::new(store), 3, EngineSettings::default());
    engine.load().await.unwrap();
    let session_id = engine.snapshot().session_id;

    time::sleep(Duration::from_millis(10_500)).await;
    let err = engine.submit().await.unwrap_err();
    assert!(matches!(err, ExamError::Persist(StorageError::Http(503))));
    assert!(err.is_retryable());
    assert_eq!(engine.state(), ExamState::Active);
    assert_eq!(repo.summary_count(session_id).unwrap(), 1);
    assert!(repo.list_answers(session_id).await.unwrap().is_empty());

    time::sleep(Duration::from_secs(5)).await;
    let SubmitOutcome::Submitted(result) = engine.submit().await.unwrap() else {
        panic!("expected a submission");
    };
    assert_eq!(result.time_spent_seconds, 15);
    assert_eq!(repo.summary_count(session_id).unwrap(), 1);
    assert_eq!(repo.list_answers(session_id).await.unwrap().len(), 3);
    let stored = repo.get_summary(session_id).await.unwrap();
    assert_eq!(stored.result().time_spent_seconds, 15);
}

#[tokio::test(start_paused = true)]
async fn hung_persist_times_out_and_rolls_back() {
    let repo = signed_in_repo(2);
    let slow = Arc::new(AtomicBool::new(true));
    let store = SlowStore {
        inner: repo.clone(),
        delay: Duration::from_secs(600),
        slow: Arc::clone(&slow),
    };
    let settings = EngineSettings::default().with_persist_timeout(Duration::from_secs(5));
    let engine = engine(&repo, Arc::new(store), 2, settings);
    engine.load().await.unwrap();

    let err = engine.submit().await.unwrap_err();
    assert!(matches!(err, ExamError::PersistTimeout(d) if d == Duration::from_secs(5)));
    assert_eq!(engine.state(), ExamState::Active);

    slow.store(false, Ordering::SeqCst);
    assert!(matches!(
        engine.submit().await.unwrap(),
        SubmitOutcome::Submitted(_)
    ));
    assert_eq!(repo.summary_count(engine.snapshot().session_id).unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_stays_loading() {
    #[derive(Clone)]
    struct DownSource;

    #[async_trait]
    impl storage::repository::QuestionSource for DownSource {
        async fn fetch_questions(
            &self,
            _category: &ExamCategory,
            _limit: u32,
        ) -> Result<Vec<Question>, StorageError> {
            Err(StorageError::Http(503))
        }

        async fn get_questions(&self, _ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
            Err(StorageError::Http(503))
        }

        async fn list_categories(&self) -> Result<Vec<ExamCategory>, StorageError> {
            Err(StorageError::Http(503))
        }
    }

    let repo = signed_in_repo(0);
    let config = ExamConfig::new(cpa(), 3, SessionId::random());
    let engine = ExamSessionEngine::new(config, Arc::new(DownSource), Arc::new(repo), fixed_clock());

    let err = engine.load().await.unwrap_err();
    assert!(matches!(err, ExamError::Fetch(StorageError::Http(503))));
    assert_eq!(engine.state(), ExamState::Loading);

    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.snapshot().remaining_seconds, 270);
}

#[tokio::test(start_paused = true)]
async fn answers_are_frozen_after_submission() {
    let repo = signed_in_repo(2);
    let engine = engine(&repo, Arc::new(repo.clone()), 2, EngineSettings::default());
    engine.load().await.unwrap();
    let q0 = QuestionId::new("q00").unwrap();
    engine.select_option(&q0, OptionKey::B).unwrap();
    engine.select_option(&q0, OptionKey::C).unwrap();
    engine.navigate(1);
    engine.submit().await.unwrap();

    let err = engine.select_option(&q0, OptionKey::A).unwrap_err();
    assert!(matches!(
        err,
        ExamError::InvalidOperation(InvalidOperation::NotActive(ExamState::Submitted))
    ));
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.answers.get(&q0), Some(OptionKey::C));
    assert_eq!(snapshot.current_index, 1);
    assert_eq!(engine.navigate(0), 1);
}

#[tokio::test(start_paused = true)]
async fn shuffle_keeps_the_same_questions() {
    let repo = signed_in_repo(8);
    let engine = engine(
        &repo,
        Arc::new(repo.clone()),
        8,
        EngineSettings::default().with_shuffle(true),
    );
    engine.load().await.unwrap();

    let mut seen = Vec::new();
    for i in 0..8 {
        engine.navigate(i);
        seen.push(engine.snapshot().current_question.unwrap().id().clone());
    }
    seen.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    seen.dedup();
    assert_eq!(seen.len(), 8);
}
