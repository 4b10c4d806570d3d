mod answers;
mod exam;
mod ids;
mod option_key;
mod question;
mod submission;
mod summary;

pub use answers::AnswerMap;
pub use exam::{ExamCategory, ExamConfig, ExamConfigError, SECONDS_PER_QUESTION};
pub use ids::{ParseIdError, QuestionId, SessionId, UserId};
pub use option_key::{AnswerChoice, OptionKey, OptionKeyError, normalize_key};
pub use question::{Question, QuestionError};
pub use submission::{AnswerRecord, SubmissionResult};
pub use summary::{ExamSummary, SummaryError};
