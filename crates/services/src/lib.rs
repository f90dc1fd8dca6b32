#![forbid(unsafe_code)]

pub mod error;
pub mod exam;
pub mod runtime;
pub mod submission;

pub use exam_core::Clock;

pub use error::{ExamServiceError, RuntimeError, SubmissionError};
pub use exam::{
    ExamSnapshot, ProctoredExam, QuestionView, SectionView, SensorBoard, TerminalNotice,
    WarningNotice,
};
pub use runtime::{
    DetectorEvent, DetectorSet, ExamRuntime, RuntimeCommand, RuntimeHandle, RuntimeOutcome,
};
pub use submission::{
    HttpSubmissionEndpoint, StoredSubmissionEndpoint, SubmissionEndpoint, SubmissionReceipt,
};
