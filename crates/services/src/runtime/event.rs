use exam_core::model::{ExamCommand, ViolationCandidate};
use exam_core::proctoring::{DetectorKind, Observation};

/// Message from a detector task to the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    Candidate(ViolationCandidate),
    Observation(Observation),
    /// The source is gone for good; the task has ended.
    Unavailable { kind: DetectorKind, reason: String },
}

/// Message from the UI to the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCommand {
    Exam(ExamCommand),
    DismissWarning,
    /// Candidate-confirmed submission.
    Submit,
    /// Tear down without submitting, e.g. when the app is closing.
    Shutdown,
}

impl From<ExamCommand> for RuntimeCommand {
    fn from(command: ExamCommand) -> Self {
        RuntimeCommand::Exam(command)
    }
}
