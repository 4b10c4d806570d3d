use prep_core::model::{AnswerRecord, ExamSummary, SessionId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, map_answer_row, map_summary_row};
use crate::repository::{ResultReader, ResultStore, StorageError};

#[async_trait::async_trait]
impl ResultStore for SqliteRepository {
    async fn current_identity(&self) -> Result<Option<UserId>, StorageError> {
        Ok(self.identity)
    }

    /// Re-persisting a session replaces its summary and answer rows.
    async fn persist_submission(
        &self,
        summary: &ExamSummary,
        answers: &[AnswerRecord],
    ) -> Result<(), StorageError> {
        let result = summary.result();
        let session_id = summary.session_id().to_string();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO exam_sessions (
                    id, user_id, exam_type, total_questions, score, percentage,
                    time_taken_seconds, total_time_given_seconds,
                    answered_count, unanswered_count, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    exam_type = excluded.exam_type,
                    total_questions = excluded.total_questions,
                    score = excluded.score,
                    percentage = excluded.percentage,
                    time_taken_seconds = excluded.time_taken_seconds,
                    total_time_given_seconds = excluded.total_time_given_seconds,
                    answered_count = excluded.answered_count,
                    unanswered_count = excluded.unanswered_count,
                    created_at = excluded.created_at
            ",
        )
        .bind(&session_id)
        .bind(summary.user_id().to_string())
        .bind(summary.category().as_str())
        .bind(i64::from(result.total_questions))
        .bind(i64::from(result.correct_count))
        .bind(i64::from(result.percentage))
        .bind(i64::from(result.time_spent_seconds))
        .bind(i64::from(result.total_allotted_seconds))
        .bind(i64::from(result.answered_count))
        .bind(i64::from(result.unanswered_count))
        .bind(summary.submitted_at())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM exam_answers WHERE session_id = ?1")
            .bind(&session_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, answer) in answers.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("answer position overflow".into()))?;
            sqlx::query(
                r"
                    INSERT INTO exam_answers (
                        session_id, position, question_id, user_choice, is_correct
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(answer.session_id.to_string())
            .bind(position)
            .bind(answer.question_id.as_str())
            .bind(answer.choice.as_str())
            .bind(answer.is_correct)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(session_id = %session_id, rows = answers.len(), "persisted exam submission");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResultReader for SqliteRepository {
    async fn get_summary(&self, session_id: SessionId) -> Result<ExamSummary, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    id, user_id, exam_type, total_questions, score, percentage,
                    time_taken_seconds, total_time_given_seconds,
                    answered_count, unanswered_count, created_at
                FROM exam_sessions
                WHERE id = ?1
            ",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_summary_row(&row)
    }

    async fn list_answers(&self, session_id: SessionId) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT session_id, question_id, user_choice, is_correct
                FROM exam_answers
                WHERE session_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_answer_row).collect()
    }

    async fn list_summaries(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ExamSummary>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, user_id, exam_type, total_questions, score, percentage,
                    time_taken_seconds, total_time_given_seconds,
                    answered_count, unanswered_count, created_at
                FROM exam_sessions
                WHERE user_id = ?1
                ORDER BY created_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(user_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_summary_row).collect()
    }
}
