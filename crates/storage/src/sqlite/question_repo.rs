use prep_core::model::{ExamCategory, Question, QuestionId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, map_question_row, ser};
use crate::repository::{QuestionRecord, QuestionSource, StorageError};

impl SqliteRepository {
    /// Insert or replace a question in the local bank.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    pub async fn upsert_question(
        &self,
        category: &ExamCategory,
        question: &Question,
    ) -> Result<(), StorageError> {
        let record = QuestionRecord::from_question(category, question);
        let [a, b, c, d] = record.options;

        sqlx::query(
            r"
                INSERT INTO questions (
                    id, exam_type, question_text,
                    option_a, option_b, option_c, option_d,
                    correct_option, correct_answer, explanation
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    exam_type = excluded.exam_type,
                    question_text = excluded.question_text,
                    option_a = excluded.option_a,
                    option_b = excluded.option_b,
                    option_c = excluded.option_c,
                    option_d = excluded.option_d,
                    correct_option = excluded.correct_option,
                    correct_answer = excluded.correct_answer,
                    explanation = excluded.explanation
            ",
        )
        .bind(record.id)
        .bind(record.category)
        .bind(record.text)
        .bind(a)
        .bind(b)
        .bind(c)
        .bind(d)
        .bind(record.correct_option)
        .bind(record.correct_answer)
        .bind(record.explanation)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl QuestionSource for SqliteRepository {
    async fn fetch_questions(
        &self,
        category: &ExamCategory,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id, exam_type, question_text,
                    option_a, option_b, option_c, option_d,
                    correct_option, correct_answer, explanation
                FROM questions
                WHERE exam_type = ?1
                ORDER BY seq ASC
                LIMIT ?2
            ",
        )
        .bind(category.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        tracing::debug!(category = %category, rows = rows.len(), "fetched questions");
        rows.iter().map(map_question_row).collect()
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
                SELECT
                    id, exam_type, question_text,
                    option_a, option_b, option_c, option_d,
                    correct_option, correct_answer, explanation
                FROM questions
                WHERE id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push_str(")\n ORDER BY seq ASC");

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.as_str());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;
        rows.iter().map(map_question_row).collect()
    }

    async fn list_categories(&self) -> Result<Vec<ExamCategory>, StorageError> {
        let rows = sqlx::query("SELECT DISTINCT exam_type FROM questions ORDER BY exam_type ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("exam_type").map_err(ser)?;
            out.push(ExamCategory::new(name).map_err(ser)?);
        }
        Ok(out)
    }
}
