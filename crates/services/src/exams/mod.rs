mod engine;
mod session;
mod view;

// Public API of the exam subsystem.
pub use crate::error::{ExamError, InvalidOperation};
pub use engine::{EngineSettings, ExamSessionEngine, SubmitOutcome};
pub use session::{ExamSession, ExamState, SubmitFailure, SubmitTrigger};
pub use view::{ExamProgress, ExamSnapshot, QuestionStatus};
