use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prep_core::model::{
    AnswerRecord, ExamCategory, ExamSummary, OptionKey, Question, QuestionError, QuestionId,
    SessionId, UserId,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("unauthorized")]
    Unauthorized,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend responded with status {0}")]
    Http(u16),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Raw question shape as backends store it.
///
/// Older rows carry the key in `correct_answer`, newer ones in
/// `correct_option`, and either may be decorated (`"(C)"`, `"c"`).
/// `into_question` is the only place that deals with that.
#[derive(Debug, Clone, Default)]
pub struct QuestionRecord {
    pub id: String,
    pub category: String,
    pub text: String,
    pub options: [String; 4],
    pub correct_option: Option<String>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
}

impl QuestionRecord {
    #[must_use]
    pub fn from_question(category: &ExamCategory, question: &Question) -> Self {
        Self {
            id: question.id().as_str().to_owned(),
            category: category.as_str().to_owned(),
            text: question.text().to_owned(),
            options: question.options().clone(),
            correct_option: Some(question.correct_key().as_str().to_owned()),
            correct_answer: None,
            explanation: question.explanation().map(str::to_owned),
        }
    }

    /// Convert the record into a domain `Question`, normalizing the key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the id, text or key is unusable.
    pub fn into_question(self) -> Result<Question, StorageError> {
        let id = QuestionId::new(self.id).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let raw_key = self
            .correct_option
            .filter(|k| !k.trim().is_empty())
            .or(self.correct_answer)
            .ok_or_else(|| StorageError::Serialization(format!("question {id} has no correct key")))?;
        let key = OptionKey::parse(&raw_key)
            .map_err(|e| StorageError::Serialization(format!("question {id}: {e}")))?;

        Question::new(id.clone(), self.text, self.options, key, self.explanation).map_err(
            |e: QuestionError| StorageError::Serialization(format!("question {id}: {e}")),
        )
    }
}

/// Read access to the question bank.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Fetch up to `limit` questions for a category, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn fetch_questions(
        &self,
        category: &ExamCategory,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError>;

    /// Fetch specific questions. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError>;

    /// Distinct categories present in the bank, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn list_categories(&self) -> Result<Vec<ExamCategory>, StorageError>;
}

/// Durable sink for submitted attempts.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// The signed-in user, or `None` when nobody is authenticated.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the auth provider cannot be reached.
    async fn current_identity(&self) -> Result<Option<UserId>, StorageError>;

    /// Persist one summary and its answer rows.
    ///
    /// Keyed on the session id: persisting the same session again replaces
    /// what was stored, so a retry after a partial write completes it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the answer rows collide with each
    /// other, or any other `StorageError` if a write fails.
    async fn persist_submission(
        &self,
        summary: &ExamSummary,
        answers: &[AnswerRecord],
    ) -> Result<(), StorageError>;
}

/// Read access to submitted attempts.
#[async_trait]
pub trait ResultReader: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session has no summary.
    async fn get_summary(&self, session_id: SessionId) -> Result<ExamSummary, StorageError>;

    /// Answer rows for a session, in the order they were scored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn list_answers(&self, session_id: SessionId) -> Result<Vec<AnswerRecord>, StorageError>;

    /// Most recent summaries first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be queried.
    async fn list_summaries(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ExamSummary>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<Vec<(ExamCategory, Question)>>>,
    identity: Arc<Mutex<Option<UserId>>>,
    summaries: Arc<Mutex<Vec<ExamSummary>>>,
    answers: Arc<Mutex<HashMap<SessionId, Vec<AnswerRecord>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs the given user in (or out, with `None`).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn set_identity(&self, user: Option<UserId>) -> Result<(), StorageError> {
        let mut guard = self.identity.lock().map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = user;
        Ok(())
    }

    /// Adds or replaces a question in the bank.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn upsert_question(
        &self,
        category: &ExamCategory,
        question: Question,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if let Some(slot) = guard.iter_mut().find(|(_, q)| q.id() == question.id()) {
            *slot = (category.clone(), question);
        } else {
            guard.push((category.clone(), question));
        }
        Ok(())
    }

    /// Number of stored summaries for a session id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn summary_count(&self, session_id: SessionId) -> Result<usize, StorageError> {
        let guard = self
            .summaries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.iter().filter(|s| s.session_id() == session_id).count())
    }
}

#[async_trait]
impl QuestionSource for InMemoryRepository {
    async fn fetch_questions(
        &self,
        category: &ExamCategory,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard
            .iter()
            .filter(|(c, _)| c == category)
            .map(|(_, q)| q.clone())
            .take(limit)
            .collect())
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| guard.iter().find(|(_, q)| q.id() == id).map(|(_, q)| q.clone()))
            .collect())
    }

    async fn list_categories(&self) -> Result<Vec<ExamCategory>, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let unique: BTreeSet<_> = guard.iter().map(|(c, _)| c.clone()).collect();
        Ok(unique.into_iter().collect())
    }
}

#[async_trait]
impl ResultStore for InMemoryRepository {
    async fn current_identity(&self) -> Result<Option<UserId>, StorageError> {
        let guard = self.identity.lock().map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(*guard)
    }

    async fn persist_submission(
        &self,
        summary: &ExamSummary,
        answers: &[AnswerRecord],
    ) -> Result<(), StorageError> {
        let mut summaries = self
            .summaries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let distinct: BTreeSet<_> = answers.iter().map(|a| &a.question_id).collect();
        if distinct.len() != answers.len() {
            return Err(StorageError::Conflict);
        }
        let mut rows = self
            .answers
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        summaries.retain(|s| s.session_id() != summary.session_id());
        summaries.push(summary.clone());
        rows.insert(summary.session_id(), answers.to_vec());
        Ok(())
    }
}

#[async_trait]
impl ResultReader for InMemoryRepository {
    async fn get_summary(&self, session_id: SessionId) -> Result<ExamSummary, StorageError> {
        let guard = self
            .summaries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .find(|s| s.session_id() == session_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_answers(&self, session_id: SessionId) -> Result<Vec<AnswerRecord>, StorageError> {
        let guard = self
            .answers
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&session_id).cloned().unwrap_or_default())
    }

    async fn list_summaries(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ExamSummary>, StorageError> {
        let guard = self
            .summaries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut out: Vec<_> = guard.iter().filter(|s| s.user_id() == user_id).cloned().collect();
        out.sort_by_key(|s| std::cmp::Reverse(s.submitted_at()));
        out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(out)
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionSource>,
    pub results: Arc<dyn ResultStore>,
    pub history: Arc<dyn ResultReader>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wires one repository that implements every trait.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: QuestionSource + ResultStore + ResultReader + Clone + 'static,
    {
        let questions: Arc<dyn QuestionSource> = Arc::new(repo.clone());
        let results: Arc<dyn ResultStore> = Arc::new(repo.clone());
        let history: Arc<dyn ResultReader> = Arc::new(repo);
        Self {
            questions,
            results,
            history,
        }
    }
}

/// Timestamp helper shared by the backends.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("invalid timestamp {raw:?}: {e}")))
}
