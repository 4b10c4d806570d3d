use std::sync::Arc;

use prep_core::model::ExamCategory;
use storage::repository::QuestionSource;

use crate::error::ResultsError;

/// Lists what can be practiced.
#[derive(Clone)]
pub struct CatalogService {
    questions: Arc<dyn QuestionSource>,
}

impl CatalogService {
    #[must_use]
    pub fn new(questions: Arc<dyn QuestionSource>) -> Self {
        Self { questions }
    }

    /// Distinct exam categories in the question source, sorted.
    ///
    /// # Errors
    ///
    /// Returns `ResultsError::Storage` on repository failures.
    pub async fn categories(&self) -> Result<Vec<ExamCategory>, ResultsError> {
        let mut categories = self.questions.list_categories().await?;
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}
