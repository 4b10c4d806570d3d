use prep_core::model::{
    AnswerChoice, AnswerRecord, ExamCategory, ExamConfig, ExamSummary, OptionKey, Question,
    QuestionId, SessionId, SubmissionResult, UserId,
};
use prep_core::time::fixed_now;
use storage::repository::{QuestionSource, ResultReader, ResultStore, StorageError};
use storage::sqlite::SqliteRepository;
use uuid::Uuid;

fn build_question(id: &str, correct: OptionKey) -> Question {
    Question::new(
        QuestionId::new(id).unwrap(),
        format!("Question {id}"),
        ["a".into(), "b".into(), "c".into(), "d".into()],
        correct,
        Some("why".into()),
    )
    .unwrap()
}

async fn open(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn summary_for(session_id: SessionId, user: UserId, answered: u32, correct: u32) -> ExamSummary {
    let config = ExamConfig::new(ExamCategory::new("CPA").unwrap(), 2, session_id);
    ExamSummary::from_result(
        &config,
        user,
        SubmissionResult {
            total_questions: 2,
            correct_count: correct,
            answered_count: answered,
            unanswered_count: 2 - answered,
            percentage: prep_core::scoring::percentage(correct, 2),
            time_spent_seconds: 100,
            total_allotted_seconds: 180,
        },
        fixed_now(),
    )
}

#[tokio::test]
async fn sqlite_fetch_respects_category_order_and_limit() {
    let repo = open("memdb_fetch").await;
    let cpa = ExamCategory::new("CPA").unwrap();
    let fe = ExamCategory::new("FE").unwrap();

    for i in 1..=4 {
        repo.upsert_question(&cpa, &build_question(&format!("cpa-{i}"), OptionKey::A))
            .await
            .unwrap();
    }
    repo.upsert_question(&fe, &build_question("fe-1", OptionKey::D))
        .await
        .unwrap();

    let fetched = repo.fetch_questions(&cpa, 3).await.unwrap();
    let ids: Vec<_> = fetched.iter().map(|q| q.id().as_str()).collect();
    assert_eq!(ids, vec!["cpa-1", "cpa-2", "cpa-3"]);
    assert_eq!(fetched[0].explanation(), Some("why"));

    let none = repo
        .fetch_questions(&ExamCategory::new("CFA").unwrap(), 10)
        .await
        .unwrap();
    assert!(none.is_empty());

    assert_eq!(repo.list_categories().await.unwrap(), vec![cpa, fe]);
}

#[tokio::test]
async fn sqlite_normalizes_legacy_correct_answer_column() {
    let repo = open("memdb_legacy").await;
    sqlx::query(
        r"
            INSERT INTO questions (
                id, exam_type, question_text, option_a, option_b, option_c, option_d,
                correct_option, correct_answer, explanation
            )
            VALUES ('legacy-1', 'CFA', 'Q', 'a', 'b', 'c', 'd', NULL, ' (c) ', NULL)
        ",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let fetched = repo
        .get_questions(&[QuestionId::new("legacy-1").unwrap()])
        .await
        .unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].correct_key(), OptionKey::C);
}

#[tokio::test]
async fn sqlite_persists_summary_and_answers_once_per_session() {
    let user = UserId::new(Uuid::new_v4());
    let repo = open("memdb_results").await.with_identity(Some(user));
    assert_eq!(repo.current_identity().await.unwrap(), Some(user));

    let session = SessionId::random();
    let summary = summary_for(session, user, 1, 1);
    let rows = vec![
        AnswerRecord {
            session_id: session,
            question_id: QuestionId::new("q-1").unwrap(),
            choice: AnswerChoice::Chosen(OptionKey::B),
            is_correct: true,
        },
        AnswerRecord {
            session_id: session,
            question_id: QuestionId::new("q-2").unwrap(),
            choice: AnswerChoice::Unattempted,
            is_correct: false,
        },
    ];

    repo.persist_submission(&summary, &rows).await.unwrap();

    let stored = repo.get_summary(session).await.unwrap();
    assert_eq!(stored, summary);
    assert_eq!(repo.list_answers(session).await.unwrap(), rows);

    // A retry of the same session replaces the stored attempt.
    let retried = summary_for(session, user, 2, 1);
    let retried_rows = vec![
        rows[0].clone(),
        AnswerRecord {
            choice: AnswerChoice::Chosen(OptionKey::A),
            ..rows[1].clone()
        },
    ];
    repo.persist_submission(&retried, &retried_rows).await.unwrap();
    assert_eq!(repo.get_summary(session).await.unwrap(), retried);
    assert_eq!(repo.list_answers(session).await.unwrap(), retried_rows);
    assert_eq!(repo.list_summaries(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_rolls_back_summary_when_answers_fail() {
    let user = UserId::new(Uuid::new_v4());
    let repo = open("memdb_atomic").await.with_identity(Some(user));

    let session = SessionId::random();
    let summary = summary_for(session, user, 0, 0);
    let duplicate = AnswerRecord {
        session_id: session,
        question_id: QuestionId::new("q-1").unwrap(),
        choice: AnswerChoice::Unattempted,
        is_correct: false,
    };

    let err = repo
        .persist_submission(&summary, &[duplicate.clone(), duplicate])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    assert!(matches!(
        repo.get_summary(session).await.unwrap_err(),
        StorageError::NotFound
    ));
}

#[tokio::test]
async fn sqlite_without_identity_is_signed_out() {
    let repo = open("memdb_identity").await;
    assert_eq!(repo.current_identity().await.unwrap(), None);
}
