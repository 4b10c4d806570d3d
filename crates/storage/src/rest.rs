//! Question bank and result store behind the hosted backend's REST API.
//!
//! Tables are exposed under `/rest/v1/<table>` with `column=op.value` filters;
//! the signed-in user comes from `/auth/v1/user`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prep_core::model::{
    AnswerChoice, AnswerRecord, ExamCategory, ExamSummary, Question, QuestionId, SessionId,
    SubmissionResult, UserId,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::repository::{
    QuestionRecord, QuestionSource, ResultReader, ResultStore, StorageError, parse_timestamp,
};

#[derive(Clone, Debug)]
pub struct RestConfig {
    pub base_url: String,
    /// Public (anon) key sent with every request.
    pub api_key: String,
    /// Session token of the signed-in user, if any.
    pub access_token: Option<String>,
}

#[derive(Clone)]
pub struct RestRepository {
    client: Client,
    config: RestConfig,
}

impl RestRepository {
    #[must_use]
    pub fn new(config: RestConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.base_url.trim_end_matches('/'))
    }

    fn auth_url(&self) -> String {
        format!("{}/auth/v1/user", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(bearer)
    }

    async fn get_rows<T>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>, StorageError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .authorize(self.client.get(self.table_url(table)))
            .query(query)
            .send()
            .await
            .map_err(http)?;
        let response = check_status(response)?;
        response.json().await.map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Insert rows, replacing any that collide on `on_conflict`.
    async fn upsert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        on_conflict: &str,
        body: &T,
    ) -> Result<(), StorageError> {
        let response = self
            .authorize(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(body)
            .send()
            .await
            .map_err(http)?;
        check_status(response)?;
        Ok(())
    }
}

fn http(e: reqwest::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn check_status(response: Response) -> Result<Response, StorageError> {
    match response.status() {
        s if s.is_success() => Ok(response),
        StatusCode::CONFLICT => Err(StorageError::Conflict),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StorageError::Unauthorized),
        StatusCode::NOT_FOUND => Err(StorageError::NotFound),
        s => Err(StorageError::Http(s.as_u16())),
    }
}

fn in_list(ids: &[QuestionId]) -> String {
    let joined = ids
        .iter()
        .map(|id| format!("\"{}\"", id.as_str().replace('"', "")))
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

//
// ─── WIRE SHAPES ───────────────────────────────────────────────────────────────
//

/// Ids arrive as JSON numbers or strings depending on the table definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Int(i64),
    Text(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Int(v) => v.to_string(),
            WireId::Text(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuestionRow {
    id: WireId,
    #[serde(default)]
    exam_type: String,
    question_text: String,
    #[serde(default)]
    option_a: String,
    #[serde(default)]
    option_b: String,
    #[serde(default)]
    option_c: String,
    #[serde(default)]
    option_d: String,
    #[serde(default)]
    correct_option: Option<String>,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

impl QuestionRow {
    fn into_record(self) -> QuestionRecord {
        QuestionRecord {
            id: self.id.into_string(),
            category: self.exam_type,
            text: self.question_text,
            options: [self.option_a, self.option_b, self.option_c, self.option_d],
            correct_option: self.correct_option,
            correct_answer: self.correct_answer,
            explanation: self.explanation,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CategoryRow {
    exam_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRow {
    id: SessionId,
    user_id: UserId,
    exam_type: String,
    total_questions: u32,
    score: u32,
    percentage: u8,
    time_taken_seconds: u32,
    total_time_given_seconds: u32,
    answered_count: u32,
    unanswered_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
}

impl SessionRow {
    fn from_summary(summary: &ExamSummary) -> Self {
        let r = summary.result();
        Self {
            id: summary.session_id(),
            user_id: summary.user_id(),
            exam_type: summary.category().as_str().to_owned(),
            total_questions: r.total_questions,
            score: r.correct_count,
            percentage: r.percentage,
            time_taken_seconds: r.time_spent_seconds,
            total_time_given_seconds: r.total_allotted_seconds,
            answered_count: r.answered_count,
            unanswered_count: r.unanswered_count,
            created_at: Some(summary.submitted_at().to_rfc3339()),
        }
    }

    fn into_summary(self) -> Result<ExamSummary, StorageError> {
        let submitted_at: DateTime<Utc> = match self.created_at.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        let category = ExamCategory::new(self.exam_type)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let result = SubmissionResult {
            total_questions: self.total_questions,
            correct_count: self.score,
            answered_count: self.answered_count,
            unanswered_count: self.unanswered_count,
            percentage: self.percentage,
            time_spent_seconds: self.time_taken_seconds,
            total_allotted_seconds: self.total_time_given_seconds,
        };
        ExamSummary::from_persisted(self.id, self.user_id, category, submitted_at, result)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct AnswerInsert<'a> {
    session_id: SessionId,
    question_id: &'a str,
    user_choice: &'static str,
    is_correct: bool,
}

#[derive(Debug, Deserialize)]
struct AnswerRow {
    session_id: SessionId,
    question_id: WireId,
    user_choice: Option<String>,
    #[serde(default)]
    is_correct: bool,
}

impl AnswerRow {
    fn into_record(self) -> Result<AnswerRecord, StorageError> {
        let question_id = QuestionId::new(self.question_id.into_string())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(AnswerRecord {
            session_id: self.session_id,
            question_id,
            choice: AnswerChoice::from_stored(self.user_choice.as_deref()),
            is_correct: self.is_correct,
        })
    }
}

//
// ─── TRAIT IMPLEMENTATIONS ─────────────────────────────────────────────────────
//

#[async_trait]
impl QuestionSource for RestRepository {
    async fn fetch_questions(
        &self,
        category: &ExamCategory,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let rows: Vec<QuestionRow> = self
            .get_rows(
                "questions",
                &[
                    ("select", "*".to_string()),
                    ("exam_type", format!("eq.{category}")),
                    ("order", "id.asc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        tracing::debug!(category = %category, rows = rows.len(), "fetched questions");
        rows.into_iter().map(|r| r.into_record().into_question()).collect()
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<QuestionRow> = self
            .get_rows("questions", &[("select", "*".to_string()), ("id", in_list(ids))])
            .await?;
        rows.into_iter().map(|r| r.into_record().into_question()).collect()
    }

    async fn list_categories(&self) -> Result<Vec<ExamCategory>, StorageError> {
        let rows: Vec<CategoryRow> = self
            .get_rows("questions", &[("select", "exam_type".to_string())])
            .await?;
        let unique: BTreeSet<String> = rows
            .into_iter()
            .filter_map(|r| r.exam_type)
            .filter(|name| !name.trim().is_empty())
            .collect();
        unique
            .into_iter()
            .map(|name| ExamCategory::new(name).map_err(|e| StorageError::Serialization(e.to_string())))
            .collect()
    }
}

#[async_trait]
impl ResultStore for RestRepository {
    async fn current_identity(&self) -> Result<Option<UserId>, StorageError> {
        let Some(token) = self.config.access_token.as_deref() else {
            return Ok(None);
        };
        let response = self
            .client
            .get(self.auth_url())
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(http)?;
        match check_status(response) {
            Ok(response) => {
                let user: AuthUser = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(user.id))
            }
            Err(StorageError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Two separate writes: the backend offers no multi-table transaction
    /// here, so a failed answer batch leaves the summary behind. Both writes
    /// are upserts keyed on the session id, so persisting again completes it.
    async fn persist_submission(
        &self,
        summary: &ExamSummary,
        answers: &[AnswerRecord],
    ) -> Result<(), StorageError> {
        self.upsert("exam_sessions", "id", &SessionRow::from_summary(summary))
            .await?;

        if answers.is_empty() {
            return Ok(());
        }
        let rows: Vec<_> = answers
            .iter()
            .map(|a| AnswerInsert {
                session_id: a.session_id,
                question_id: a.question_id.as_str(),
                user_choice: a.choice.as_str(),
                is_correct: a.is_correct,
            })
            .collect();
        self.upsert("exam_answers", "session_id,question_id", rows.as_slice())
            .await
    }
}

#[async_trait]
impl ResultReader for RestRepository {
    async fn get_summary(&self, session_id: SessionId) -> Result<ExamSummary, StorageError> {
        let rows: Vec<SessionRow> = self
            .get_rows(
                "exam_sessions",
                &[("select", "*".to_string()), ("id", format!("eq.{session_id}"))],
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or(StorageError::NotFound)?
            .into_summary()
    }

    async fn list_answers(&self, session_id: SessionId) -> Result<Vec<AnswerRecord>, StorageError> {
        let rows: Vec<AnswerRow> = self
            .get_rows(
                "exam_answers",
                &[
                    ("select", "session_id,question_id,user_choice,is_correct".to_string()),
                    ("session_id", format!("eq.{session_id}")),
                ],
            )
            .await?;
        rows.into_iter().map(AnswerRow::into_record).collect()
    }

    async fn list_summaries(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ExamSummary>, StorageError> {
        let rows: Vec<SessionRow> = self
            .get_rows(
                "exam_sessions",
                &[
                    ("select", "*".to_string()),
                    ("user_id", format!("eq.{user_id}")),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        rows.into_iter().map(SessionRow::into_summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{ExamConfig, OptionKey};
    use prep_core::time::fixed_now;
    use uuid::Uuid;

    #[test]
    fn question_row_accepts_either_key_field() {
        let rows: Vec<QuestionRow> = serde_json::from_str(
            r#"[
                {"id": 1, "exam_type": "CPA", "question_text": "Q1",
                 "option_a": "a", "option_b": "b", "option_c": "c", "option_d": "d",
                 "correct_option": "(B)"},
                {"id": "9f0e", "exam_type": "CPA", "question_text": "Q2",
                 "option_a": "a", "option_b": "b", "option_c": "c", "option_d": "d",
                 "correct_answer": "d", "explanation": "because"}
            ]"#,
        )
        .unwrap();

        let questions: Vec<_> = rows
            .into_iter()
            .map(|r| r.into_record().into_question().unwrap())
            .collect();
        assert_eq!(questions[0].id().as_str(), "1");
        assert_eq!(questions[0].correct_key(), OptionKey::B);
        assert_eq!(questions[1].id().as_str(), "9f0e");
        assert_eq!(questions[1].correct_key(), OptionKey::D);
        assert_eq!(questions[1].explanation(), Some("because"));
    }

    #[test]
    fn session_row_round_trips_summary_fields() {
        let session = SessionId::random();
        let config = ExamConfig::new(ExamCategory::new("CFA").unwrap(), 20, session);
        let summary = ExamSummary::from_result(
            &config,
            UserId::new(Uuid::nil()),
            SubmissionResult {
                total_questions: 20,
                correct_count: 12,
                answered_count: 15,
                unanswered_count: 5,
                percentage: 60,
                time_spent_seconds: 1200,
                total_allotted_seconds: 1800,
            },
            fixed_now(),
        );

        let json = serde_json::to_value(SessionRow::from_summary(&summary)).unwrap();
        assert_eq!(json["score"], 12);
        assert_eq!(json["time_taken_seconds"], 1200);
        assert_eq!(json["exam_type"], "CFA");

        let back: SessionRow = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_summary().unwrap(), summary);
    }

    #[test]
    fn answer_row_normalizes_stored_choice() {
        let row: AnswerRow = serde_json::from_str(&format!(
            r#"{{"session_id": "{}", "question_id": 4, "user_choice": "(c)", "is_correct": true}}"#,
            Uuid::nil()
        ))
        .unwrap();
        let record = row.into_record().unwrap();
        assert_eq!(record.choice, AnswerChoice::Chosen(OptionKey::C));
        assert_eq!(record.question_id.as_str(), "4");
    }

    #[test]
    fn in_list_quotes_ids() {
        let ids = vec![QuestionId::new("a").unwrap(), QuestionId::new("7").unwrap()];
        assert_eq!(in_list(&ids), r#"in.("a","7")"#);
    }

    #[tokio::test]
    async fn identity_without_token_is_signed_out() {
        let repo = RestRepository::new(RestConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "anon".into(),
            access_token: None,
        });
        assert_eq!(repo.current_identity().await.unwrap(), None);
    }
}
