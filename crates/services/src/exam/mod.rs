mod service;
mod view;

pub use crate::error::ExamServiceError;
pub use service::ProctoredExam;
pub use view::{
    ExamSnapshot, QuestionView, SectionView, SensorBoard, TerminalNotice, WarningNotice,
};
