use thiserror::Error;

use crate::model::{ExamError, PaperError, ProctoringSettingsError, QuestionError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    Paper(#[from] PaperError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Settings(#[from] ProctoringSettingsError),
}
