mod exam;
mod ids;
mod paper;
mod proctoring_settings;
mod question;
mod section;
mod submission;
mod violation;

pub use ids::{AttemptId, ParseIdError, QuestionId, ViolationId};

pub use exam::{
    CommandOutcome, Cursor, ExamCommand, ExamError, ExamSession, ExamStats, ScoreCard,
    Submission, SubmitReason,
};
pub use paper::{ExamPaper, MarkingScheme, PaperError, PaperSection};
pub use proctoring_settings::{
    ProctoringSettings, ProctoringSettingsDraft, ProctoringSettingsError,
};
pub use question::{Choice, Question, QuestionError, QuestionState, QuestionStatus};
pub use section::{Section, SectionStats};
pub use submission::{AnswerRecord, SectionReport, SubmissionSnapshot};
pub use violation::{
    CategoryCounts, LiveIndicators, Severity, ViolationCandidate, ViolationCategory,
    ViolationEvent,
};
