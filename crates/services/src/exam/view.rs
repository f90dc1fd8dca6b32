use chrono::{DateTime, Utc};
use serde::Serialize;

use exam_core::model::{
    AttemptId, Choice, Cursor, ExamStats, LiveIndicators, QuestionId, QuestionStatus,
    SectionStats, Submission, SubmitReason, ViolationEvent,
};
use exam_core::proctoring::{
    Breach, DetectorKind, FaceObservation, NoiseObservation, SensorStatus,
};

/// Presentation-agnostic view of the question under the cursor.
///
/// Carries no answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub number: u32,
    pub text: String,
    pub options: [String; 4],
    pub status: QuestionStatus,
    /// Pending choice if any, otherwise the committed answer.
    pub selected: Option<Choice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionView {
    pub name: String,
    pub stats: SectionStats,
}

/// The dismissible notice for the latest accepted violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarningNotice {
    pub event: ViolationEvent,
    /// Accepted events of the same category so far.
    pub category_count: u32,
    pub total: u32,
}

/// Shown once the attempt is over. `Terminated` is the violation-limit
/// variant and is never conflated with time expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalNotice {
    Submitted { at: DateTime<Utc> },
    TimeExpired { at: DateTime<Utc> },
    Terminated { at: DateTime<Utc>, breach: Option<Breach> },
}

impl TerminalNotice {
    #[must_use]
    pub fn from_submission(submission: Submission, breach: Option<Breach>) -> Self {
        let at = submission.submitted_at;
        match submission.reason {
            SubmitReason::Candidate => TerminalNotice::Submitted { at },
            SubmitReason::TimeExpired => TerminalNotice::TimeExpired { at },
            SubmitReason::ViolationLimit => TerminalNotice::Terminated { at, breach },
        }
    }
}

/// Health of every detector's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorBoard {
    pub face: SensorStatus,
    pub noise: SensorStatus,
    pub focus: SensorStatus,
}

impl Default for SensorBoard {
    fn default() -> Self {
        Self {
            face: SensorStatus::Active,
            noise: SensorStatus::Active,
            focus: SensorStatus::Active,
        }
    }
}

impl SensorBoard {
    #[must_use]
    pub fn get(&self, kind: DetectorKind) -> &SensorStatus {
        match kind {
            DetectorKind::Face => &self.face,
            DetectorKind::Noise => &self.noise,
            DetectorKind::Focus => &self.focus,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: DetectorKind) -> &mut SensorStatus {
        match kind {
            DetectorKind::Face => &mut self.face,
            DetectorKind::Noise => &mut self.noise,
            DetectorKind::Focus => &mut self.focus,
        }
    }

    pub(crate) fn stop_all(&mut self) {
        for status in [&mut self.face, &mut self.noise, &mut self.focus] {
            if status.is_active() {
                *status = SensorStatus::Stopped;
            }
        }
    }
}

/// Read-only state handed to renderers after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamSnapshot {
    pub attempt_id: AttemptId,
    pub exam_title: String,
    pub cursor: Cursor,
    pub question: QuestionView,
    pub sections: Vec<SectionView>,
    pub stats: ExamStats,
    pub is_first_question: bool,
    pub is_last_question: bool,

    pub remaining_secs: u32,
    /// `HH:MM:SS`
    pub timer_label: String,
    pub running_low: bool,

    pub warning: Option<WarningNotice>,
    pub live: LiveIndicators,
    pub sensors: SensorBoard,
    pub last_face: Option<FaceObservation>,
    pub last_noise: Option<NoiseObservation>,

    pub auto_submit: Option<Breach>,
    pub notice: Option<TerminalNotice>,
}

impl ExamSnapshot {
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.notice.is_some()
    }
}
