use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use exam_core::model::{
    AttemptId, CommandOutcome, ExamCommand, ExamPaper, ExamSession, ProctoringSettings,
    SubmissionSnapshot, SubmitReason, ViolationCandidate,
};
use exam_core::proctoring::{
    DetectorKind, FaceObservation, Ingest, NoiseObservation, Observation, SensorStatus,
    ViolationAggregator,
};
use exam_core::{ExamTimer, TimerTick};

use super::view::{
    ExamSnapshot, QuestionView, SectionView, SensorBoard, TerminalNotice, WarningNotice,
};
use crate::error::ExamServiceError;

//
// ─── PROCTORED EXAM ────────────────────────────────────────────────────────────
//

/// One candidate's attempt: progress tracker, countdown and violation engine
/// behind a single writer.
///
/// Every mutation takes an explicit `now` so callers decide where time comes
/// from. Time expiry and the escalation flag both funnel into `submit`, which
/// only acts once.
pub struct ProctoredExam {
    candidate_id: String,
    paper: ExamPaper,
    session: ExamSession,
    timer: ExamTimer,
    aggregator: ViolationAggregator,
    sensors: SensorBoard,
    last_face: Option<FaceObservation>,
    last_noise: Option<NoiseObservation>,
    handed_off: bool,
}

impl ProctoredExam {
    /// Start an attempt and anchor its countdown at `now`.
    ///
    /// A zero escalation limit is already breached, so such an exam comes
    /// back submitted with `SubmitReason::ViolationLimit`.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::EmptyCandidate` for a blank candidate id and
    /// `ExamServiceError::Exam` if the paper is invalid.
    pub fn start(
        paper: ExamPaper,
        settings: &ProctoringSettings,
        candidate_id: impl Into<String>,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
    ) -> Result<Self, ExamServiceError> {
        let candidate_id = candidate_id.into();
        if candidate_id.trim().is_empty() {
            return Err(ExamServiceError::EmptyCandidate);
        }

        let session = ExamSession::start(&paper, attempt_id, now)?;
        let timer = ExamTimer::start(paper.duration_secs, now);
        let aggregator = ViolationAggregator::new(settings);
        info!(%attempt_id, candidate = %candidate_id, title = %paper.title, "exam started");

        let mut exam = Self {
            candidate_id,
            paper,
            session,
            timer,
            aggregator,
            sensors: SensorBoard::default(),
            last_face: None,
            last_noise: None,
            handed_off: false,
        };
        if exam.aggregator.is_auto_submit() {
            exam.submit(SubmitReason::ViolationLimit, now);
        }
        Ok(exam)
    }

    #[must_use]
    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    #[must_use]
    pub fn paper(&self) -> &ExamPaper {
        &self.paper
    }

    #[must_use]
    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    #[must_use]
    pub fn timer(&self) -> &ExamTimer {
        &self.timer
    }

    #[must_use]
    pub fn aggregator(&self) -> &ViolationAggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn sensors(&self) -> &SensorBoard {
        &self.sensors
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.session.is_submitted()
    }

    //
    // ─── COMMANDS ──────────────────────────────────────────────────────────────
    //

    /// Apply a candidate command.
    ///
    /// The timer is polled first, so a command racing expiry lands on a
    /// frozen session and is ignored.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Exam` for an out-of-range jump or section.
    pub fn command(
        &mut self,
        command: ExamCommand,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome, ExamServiceError> {
        self.tick(now);
        let outcome = self.session.apply(command)?;
        if outcome == CommandOutcome::Ignored {
            debug!(?command, "command ignored");
        }
        Ok(outcome)
    }

    /// Poll the countdown; expiry forces a `TimeExpired` submission.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TimerTick {
        if self.is_submitted() {
            return TimerTick {
                remaining_secs: self.timer.remaining_secs(),
                expired_now: false,
            };
        }
        let tick = self.timer.poll(now);
        if self.timer.is_expired() {
            self.submit(SubmitReason::TimeExpired, now);
        }
        tick
    }

    //
    // ─── PROCTORING ────────────────────────────────────────────────────────────
    //

    /// Route a detector candidate through the aggregator. The candidate that
    /// breaches a limit forces a `ViolationLimit` submission.
    ///
    /// The timer is polled first: a candidate arriving after the deadline
    /// finds the exam submitted as `TimeExpired` and is dropped.
    pub fn ingest(&mut self, candidate: ViolationCandidate, now: DateTime<Utc>) -> Ingest {
        self.tick(now);
        let outcome = self.aggregator.ingest(candidate);
        if let Ingest::Accepted {
            breach: Some(breach),
            ..
        } = &outcome
        {
            warn!(%breach, "violation limit reached; terminating exam");
            self.submit(SubmitReason::ViolationLimit, now);
        }
        outcome
    }

    /// Record the latest raw sensor measurement for live indicators.
    pub fn observe(&mut self, observation: Observation) {
        if self.is_submitted() {
            return;
        }
        match observation {
            Observation::Face(face) => self.last_face = Some(face),
            Observation::Noise(noise) => self.last_noise = Some(noise),
        }
    }

    /// Surface a permanently unavailable sensor. Never counted as a violation.
    pub fn sensor_unavailable(&mut self, kind: DetectorKind, reason: impl Into<String>) {
        let reason = reason.into();
        let status = self.sensors.get_mut(kind);
        if matches!(status, SensorStatus::Unavailable { .. }) {
            return;
        }
        warn!(%kind, %reason, "sensor unavailable");
        *status = SensorStatus::Unavailable { reason };
    }

    pub fn dismiss_warning(&mut self) -> bool {
        self.aggregator.dismiss_warning()
    }

    //
    // ─── SUBMISSION ────────────────────────────────────────────────────────────
    //

    /// Freeze the attempt. Returns false if it was already submitted, in which
    /// case nothing changes.
    ///
    /// The aggregator is closed before anything else so no candidate can be
    /// counted after this point.
    pub fn submit(&mut self, reason: SubmitReason, now: DateTime<Utc>) -> bool {
        if self.is_submitted() {
            debug!(reason = reason.as_str(), "submit ignored; already submitted");
            return false;
        }
        self.close();
        self.session.submit(reason, now);
        info!(
            attempt_id = %self.session.attempt_id(),
            reason = reason.as_str(),
            forced = reason.is_forced(),
            "exam submitted"
        );
        true
    }

    /// Stop counting violations and mark live sensors stopped. Called on
    /// submission and on teardown; the session itself stays as it is.
    pub fn close(&mut self) {
        if !self.aggregator.is_closed() {
            self.aggregator.close();
            self.sensors.stop_all();
        }
    }

    /// The final record, once submitted.
    #[must_use]
    pub fn submission(&self) -> Option<SubmissionSnapshot> {
        SubmissionSnapshot::capture(
            &self.candidate_id,
            &self.paper,
            &self.session,
            &self.aggregator,
        )
    }

    /// The final record, handed out exactly once for delivery.
    pub fn take_submission(&mut self) -> Option<SubmissionSnapshot> {
        if self.handed_off {
            return None;
        }
        let snapshot = self.submission()?;
        self.handed_off = true;
        Some(snapshot)
    }

    //
    // ─── SNAPSHOT ──────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn snapshot(&self) -> ExamSnapshot {
        let session = &self.session;
        let cursor = session.cursor();
        let state = session.current_question();
        let question = &self.paper.sections[cursor.section].questions[cursor.question];
        let summary = self.aggregator.ledger().summary();

        let warning = self.aggregator.active_warning().map(|event| WarningNotice {
            event: event.clone(),
            category_count: summary.counts.get(event.category),
            total: summary.total,
        });

        ExamSnapshot {
            attempt_id: session.attempt_id(),
            exam_title: self.paper.title.clone(),
            cursor,
            question: QuestionView {
                id: question.id,
                number: question.number,
                text: question.text.clone(),
                options: question.options.clone(),
                status: state.status(),
                selected: state.displayed_choice(),
            },
            sections: session
                .sections()
                .iter()
                .map(|s| SectionView {
                    name: s.name().to_string(),
                    stats: s.stats(),
                })
                .collect(),
            stats: session.stats(),
            is_first_question: session.is_first_question(),
            is_last_question: session.is_last_question(),
            remaining_secs: self.timer.remaining_secs(),
            timer_label: self.timer.formatted(),
            running_low: self.timer.is_running_low(),
            warning,
            live: summary.live,
            sensors: self.sensors.clone(),
            last_face: self.last_face,
            last_noise: self.last_noise,
            auto_submit: self.aggregator.auto_submit(),
            notice: session
                .submission()
                .map(|s| TerminalNotice::from_submission(s, self.aggregator.auto_submit())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use exam_core::model::{
        Choice, PaperSection, ProctoringSettingsDraft, Question, QuestionId, QuestionStatus,
        Severity, ViolationCategory,
    };
    use exam_core::proctoring::{Breach, DropReason};
    use exam_core::time::fixed_now;

    fn paper(sections: usize, per_section: usize, duration_secs: u32) -> ExamPaper {
        let mut next = 0_u64;
        let sections = (0..sections)
            .map(|s| PaperSection {
                name: format!("Section {}", s + 1),
                questions: (0..per_section)
                    .map(|_| {
                        next += 1;
                        Question {
                            id: QuestionId::new(next),
                            number: u32::try_from(next).unwrap(),
                            text: format!("Question {next}"),
                            options: ["w".into(), "x".into(), "y".into(), "z".into()],
                            correct: Choice::B,
                        }
                    })
                    .collect(),
            })
            .collect();
        ExamPaper {
            title: "Mock".into(),
            duration_secs,
            marking: Default::default(),
            sections,
        }
    }

    fn start(settings: &ProctoringSettings) -> ProctoredExam {
        ProctoredExam::start(
            paper(2, 2, 1800),
            settings,
            "APP-1",
            AttemptId::generate(),
            fixed_now(),
        )
        .unwrap()
    }

    fn focus_lost(at: DateTime<Utc>) -> ViolationCandidate {
        ViolationCandidate::new(ViolationCategory::FocusLost, Severity::High, "tab", at)
    }

    #[test]
    fn rejects_blank_candidate() {
        let err = ProctoredExam::start(
            paper(1, 1, 60),
            &ProctoringSettings::default(),
            "  ",
            AttemptId::generate(),
            fixed_now(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ExamServiceError::EmptyCandidate));
    }

    #[test]
    fn snapshot_reflects_commands_without_answer_key() {
        let mut exam = start(&ProctoringSettings::default());
        let now = fixed_now();

        exam.command(ExamCommand::Select(Choice::B), now).unwrap();
        let snap = exam.snapshot();
        assert_eq!(snap.question.status, QuestionStatus::Visited);
        assert_eq!(snap.question.selected, Some(Choice::B));
        assert!(snap.is_first_question);

        exam.command(ExamCommand::SaveAndNext, now).unwrap();
        let snap = exam.snapshot();
        assert_eq!(snap.cursor.question, 1);
        assert_eq!(snap.stats.answered, 1);
        assert_eq!(snap.sections[0].stats.answered, 1);
        assert_eq!(snap.timer_label, "00:30:00");

        let json = serde_json::to_value(&snap).unwrap();
        assert!(json["question"].get("correct").is_none());
    }

    #[test]
    fn out_of_range_jump_is_an_error() {
        let mut exam = start(&ProctoringSettings::default());
        let err = exam.command(ExamCommand::JumpTo(9), fixed_now()).unwrap_err();
        assert!(matches!(err, ExamServiceError::Exam(_)));
    }

    #[test]
    fn expiry_forces_submission_once() {
        let mut exam = start(&ProctoringSettings::default());
        let late = fixed_now() + Duration::seconds(1800);

        let tick = exam.tick(late);
        assert!(tick.expired_now);
        assert_eq!(tick.remaining_secs, 0);
        assert!(exam.is_submitted());
        assert!(!exam.tick(late + Duration::seconds(5)).expired_now);

        let snap = exam.snapshot();
        assert!(matches!(snap.notice, Some(TerminalNotice::TimeExpired { .. })));
        assert_eq!(
            exam.submission().map(|s| s.reason),
            Some(SubmitReason::TimeExpired)
        );
    }

    #[test]
    fn candidate_after_deadline_loses_to_expiry() {
        let settings = ProctoringSettingsDraft {
            focus_lost_limit: Some(1),
            ..ProctoringSettingsDraft::default()
        }
        .validate()
        .unwrap();
        let mut exam = ProctoredExam::start(
            paper(1, 2, 60),
            &settings,
            "APP-1",
            AttemptId::generate(),
            fixed_now(),
        )
        .unwrap();
        // No timer tick between the deadline and the event.
        let late = fixed_now() + Duration::seconds(61);

        let outcome = exam.ingest(focus_lost(late), late);
        assert_eq!(outcome, Ingest::Dropped(DropReason::Closed));
        assert_eq!(exam.aggregator().ledger().total(), 0);
        assert_eq!(
            exam.submission().map(|s| s.reason),
            Some(SubmitReason::TimeExpired)
        );
        assert!(matches!(
            exam.snapshot().notice,
            Some(TerminalNotice::TimeExpired { .. })
        ));
    }

    #[test]
    fn command_after_expiry_is_ignored() {
        let mut exam = start(&ProctoringSettings::default());
        let late = fixed_now() + Duration::seconds(2000);

        let outcome = exam.command(ExamCommand::Select(Choice::A), late).unwrap();
        assert_eq!(outcome, CommandOutcome::Ignored);
        assert!(exam.is_submitted());
        assert_eq!(exam.snapshot().question.selected, None);
    }

    #[test]
    fn third_focus_loss_terminates_with_distinct_notice() {
        let settings = ProctoringSettingsDraft {
            cooldown_ms: 0,
            ..ProctoringSettingsDraft::default()
        }
        .validate()
        .unwrap();
        let mut exam = start(&settings);
        let now = fixed_now();

        for i in 0..2 {
            let outcome = exam.ingest(focus_lost(now + Duration::seconds(i)), now);
            assert!(matches!(outcome, Ingest::Accepted { breach: None, .. }));
            assert_eq!(exam.snapshot().warning.map(|w| w.category_count), Some(i as u32 + 1));
            assert!(exam.dismiss_warning());
        }
        let third = exam.ingest(focus_lost(now + Duration::seconds(2)), now);
        assert!(matches!(
            third,
            Ingest::Accepted {
                breach: Some(Breach::Category { .. }),
                ..
            }
        ));
        assert!(exam.is_submitted());

        let snap = exam.snapshot();
        assert!(matches!(
            snap.notice,
            Some(TerminalNotice::Terminated {
                breach: Some(Breach::Category { .. }),
                ..
            })
        ));
        assert_eq!(snap.live.tab_switch_count, 3);

        // closed after submission
        assert_eq!(
            exam.ingest(focus_lost(now + Duration::seconds(3)), now),
            Ingest::Dropped(DropReason::Closed)
        );
    }

    #[test]
    fn double_submit_leaves_state_identical() {
        let mut exam = start(&ProctoringSettings::default());
        let now = fixed_now();
        exam.ingest(focus_lost(now), now);

        assert!(exam.submit(SubmitReason::Candidate, now));
        let first = exam.submission().unwrap();
        assert!(!exam.submit(SubmitReason::ViolationLimit, now + Duration::seconds(1)));
        let second = exam.submission().unwrap();

        assert_eq!(first, second);
        assert_eq!(second.reason, SubmitReason::Candidate);
        assert_eq!(second.violation_summary.total, 1);
    }

    #[test]
    fn submission_is_handed_off_once() {
        let mut exam = start(&ProctoringSettings::default());
        assert!(exam.take_submission().is_none());

        exam.submit(SubmitReason::Candidate, fixed_now());
        assert!(exam.take_submission().is_some());
        assert!(exam.take_submission().is_none());
        assert!(exam.submission().is_some());
    }

    #[test]
    fn zero_limit_submits_at_start() {
        let settings = ProctoringSettingsDraft {
            global_limit: 0,
            ..ProctoringSettingsDraft::default()
        }
        .validate()
        .unwrap();
        let exam = start(&settings);

        assert!(exam.is_submitted());
        let snapshot = exam.submission().unwrap();
        assert!(snapshot.terminated);
        assert!(matches!(
            snapshot.breach,
            Some(Breach::Global { total: 0, limit: 0 })
        ));
    }

    #[test]
    fn unavailable_sensor_is_reported_not_counted() {
        let mut exam = start(&ProctoringSettings::default());
        exam.sensor_unavailable(DetectorKind::Face, "camera permission denied");
        exam.sensor_unavailable(DetectorKind::Face, "again");

        let snap = exam.snapshot();
        assert_eq!(
            snap.sensors.face,
            SensorStatus::Unavailable {
                reason: "camera permission denied".into()
            }
        );
        assert!(snap.sensors.noise.is_active());
        assert_eq!(snap.live.warning_count, 0);
        assert!(snap.warning.is_none());

        exam.submit(SubmitReason::Candidate, fixed_now());
        let snap = exam.snapshot();
        assert_eq!(snap.sensors.noise, SensorStatus::Stopped);
        assert!(matches!(snap.sensors.face, SensorStatus::Unavailable { .. }));
    }

    #[test]
    fn observations_feed_live_indicators() {
        let mut exam = start(&ProctoringSettings::default());
        exam.observe(Observation::Face(FaceObservation {
            face_count: 2,
            checked_at: fixed_now(),
        }));
        assert_eq!(exam.snapshot().last_face.map(|f| f.face_count), Some(2));
        assert!(exam.snapshot().last_noise.is_none());
    }

    struct LoudMic;

    impl exam_core::proctoring::AudioSource for LoudMic {
        fn read(&mut self) -> Result<Vec<f32>, exam_core::proctoring::SourceError> {
            Ok(vec![0.6; 128])
        }
    }

    #[test]
    fn five_seconds_of_noise_is_counted_once() {
        use exam_core::proctoring::{NoiseDetector, Reading, SampledDetector};

        let settings = ProctoringSettings::default();
        let mut exam = start(&settings);
        let mut mic = NoiseDetector::new(
            Box::new(LoudMic),
            settings.noise_sample_interval(),
            settings.noise_threshold(),
            settings.noise_sustain(),
        );

        // 60 samples per second, dismissing every warning as soon as it shows.
        let mut candidates = 0;
        for i in 0..=300_i64 {
            let now = fixed_now() + Duration::milliseconds(i * 1000 / 60);
            if let Reading::Candidate(candidate) = mic.sample(now) {
                candidates += 1;
                exam.ingest(candidate, now);
                exam.dismiss_warning();
            }
        }

        assert!(candidates > 1 && candidates < 10);
        assert_eq!(exam.aggregator().ledger().total(), 1);
        assert!(!exam.is_submitted());
    }
}
