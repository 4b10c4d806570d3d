use thiserror::Error;

use crate::model::{
    ExamConfigError, OptionKeyError, ParseIdError, QuestionError, SummaryError,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    OptionKey(#[from] OptionKeyError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    ExamConfig(#[from] ExamConfigError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}
