//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use prep_core::model::QuestionId;
use storage::repository::StorageError;

use crate::exams::ExamState;

/// Operations the engine refuses in its current state.
///
/// These never change state; they are reported so callers can tell a
/// rejected call from a successful one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidOperation {
    #[error("exam is {0}, not active")]
    NotActive(ExamState),
    #[error("exam has already been loaded")]
    AlreadyLoaded,
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),
}

/// Errors emitted by `ExamSessionEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamError {
    #[error("failed to load questions: {0}")]
    Fetch(#[source] StorageError),
    #[error("failed to persist submission: {0}")]
    Persist(#[source] StorageError),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("persisting the submission timed out after {0:?}")]
    PersistTimeout(Duration),
    #[error(transparent)]
    InvalidOperation(#[from] InvalidOperation),
}

impl ExamError {
    /// Whether calling `submit` again may succeed.
    ///
    /// A conflict means the rows themselves were rejected; sending them
    /// again cannot help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persist(StorageError::Conflict) => false,
            Self::Persist(_) | Self::PersistTimeout(_) => true,
            _ => false,
        }
    }
}

/// Errors emitted by `ResultsService` and `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResultsError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_persist_failures_are_retryable() {
        assert!(ExamError::Persist(StorageError::Http(503)).is_retryable());
        assert!(ExamError::PersistTimeout(Duration::from_secs(30)).is_retryable());
        assert!(!ExamError::Persist(StorageError::Conflict).is_retryable());
        assert!(!ExamError::NotAuthenticated.is_retryable());
        assert!(!ExamError::Fetch(StorageError::Http(503)).is_retryable());
    }
}
