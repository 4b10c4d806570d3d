use std::collections::HashMap;

use crate::model::ids::QuestionId;
use crate::model::option_key::{AnswerChoice, OptionKey};

/// Answers chosen so far, keyed by question.
///
/// Entries are only ever inserted or overwritten; a question that was
/// answered stays answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerMap {
    entries: HashMap<QuestionId, OptionKey>,
}

impl AnswerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the answer for a question.
    ///
    /// Returns the previous answer, if any.
    pub fn record(&mut self, question_id: QuestionId, key: OptionKey) -> Option<OptionKey> {
        self.entries.insert(question_id, key)
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<OptionKey> {
        self.entries.get(question_id).copied()
    }

    #[must_use]
    pub fn choice_for(&self, question_id: &QuestionId) -> AnswerChoice {
        self.get(question_id).into()
    }

    #[must_use]
    pub fn is_answered(&self, question_id: &QuestionId) -> bool {
        self.entries.contains_key(question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, OptionKey)> {
        self.entries.iter().map(|(id, key)| (id, *key))
    }
}
