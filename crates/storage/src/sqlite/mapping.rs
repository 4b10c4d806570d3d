use prep_core::model::{
    AnswerChoice, AnswerRecord, ExamCategory, ExamSummary, Question, QuestionId, SessionId,
    SubmissionResult, UserId,
};
use sqlx::Row;

use crate::repository::{QuestionRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn u32_col(row: &sqlx::sqlite::SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let record = QuestionRecord {
        id: row.try_get("id").map_err(ser)?,
        category: row.try_get("exam_type").map_err(ser)?,
        text: row.try_get("question_text").map_err(ser)?,
        options: [
            row.try_get("option_a").map_err(ser)?,
            row.try_get("option_b").map_err(ser)?,
            row.try_get("option_c").map_err(ser)?,
            row.try_get("option_d").map_err(ser)?,
        ],
        correct_option: row.try_get("correct_option").map_err(ser)?,
        correct_answer: row.try_get("correct_answer").map_err(ser)?,
        explanation: row.try_get("explanation").map_err(ser)?,
    };
    record.into_question()
}

pub(crate) fn map_summary_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExamSummary, StorageError> {
    let session_id: SessionId = row.try_get::<String, _>("id").map_err(ser)?.parse().map_err(ser)?;
    let user_id: UserId = row
        .try_get::<String, _>("user_id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let category = ExamCategory::new(row.try_get::<String, _>("exam_type").map_err(ser)?)
        .map_err(ser)?;
    let submitted_at = row.try_get("created_at").map_err(ser)?;
    let percentage = u8::try_from(row.try_get::<i64, _>("percentage").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("invalid percentage".into()))?;

    let result = SubmissionResult {
        total_questions: u32_col(row, "total_questions")?,
        correct_count: u32_col(row, "score")?,
        answered_count: u32_col(row, "answered_count")?,
        unanswered_count: u32_col(row, "unanswered_count")?,
        percentage,
        time_spent_seconds: u32_col(row, "time_taken_seconds")?,
        total_allotted_seconds: u32_col(row, "total_time_given_seconds")?,
    };

    ExamSummary::from_persisted(session_id, user_id, category, submitted_at, result).map_err(ser)
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerRecord, StorageError> {
    let session_id: SessionId = row
        .try_get::<String, _>("session_id")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let question_id = QuestionId::new(row.try_get::<String, _>("question_id").map_err(ser)?)
        .map_err(ser)?;
    let choice: String = row.try_get("user_choice").map_err(ser)?;
    let is_correct: bool = row.try_get("is_correct").map_err(ser)?;

    Ok(AnswerRecord {
        session_id,
        question_id,
        choice: AnswerChoice::from_stored(Some(&choice)),
        is_correct,
    })
}
