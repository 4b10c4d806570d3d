#![forbid(unsafe_code)]

pub mod catalog;
pub mod error;
pub mod exams;
pub mod results;

pub use prep_core::Clock;

pub use catalog::CatalogService;
pub use error::{ExamError, InvalidOperation, ResultsError};
pub use exams::{
    EngineSettings, ExamProgress, ExamSessionEngine, ExamSnapshot, ExamState, QuestionStatus,
    SubmitFailure, SubmitOutcome, SubmitTrigger,
};
pub use results::{ExamResultView, ResultsService, ReviewItem, ReviewStatus, UserStats};
