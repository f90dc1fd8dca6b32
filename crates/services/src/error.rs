//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{ExamError, ProctoringSettingsError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProctoredExam`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamServiceError {
    #[error("candidate id cannot be empty")]
    EmptyCandidate,
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    Settings(#[from] ProctoringSettingsError),
}

/// Errors emitted by submission endpoints.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("invalid submission url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("submission url must be http or https with a path, got {0}")]
    UnsupportedUrl(String),
    #[error("submission request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

/// Errors emitted by the exam runtime handle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    #[error("exam runtime has stopped")]
    Stopped,
    #[error("exam runtime task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
