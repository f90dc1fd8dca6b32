use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::exam::{ExamSession, ExamStats, ScoreCard, SubmitReason};
use crate::model::ids::{AttemptId, QuestionId};
use crate::model::paper::ExamPaper;
use crate::model::question::Choice;
use crate::model::section::SectionStats;
use crate::model::violation::{LiveIndicators, ViolationEvent};
use crate::proctoring::{Breach, ViolationAggregator, ViolationSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionReport {
    pub name: String,
    pub stats: SectionStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub choice: Choice,
}

/// Final record of an attempt, handed to the submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSnapshot {
    pub attempt_id: AttemptId,
    pub candidate_id: String,
    pub exam_title: String,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub reason: SubmitReason,
    pub terminated: bool,
    pub breach: Option<Breach>,
    pub stats: ExamStats,
    pub sections: Vec<SectionReport>,
    pub answers: Vec<AnswerRecord>,
    pub score: ScoreCard,
    pub live_indicator: LiveIndicators,
    pub violation_summary: ViolationSummary,
    pub violations: Vec<ViolationEvent>,
}

impl SubmissionSnapshot {
    /// Captures a submitted session. Returns `None` while the session is open.
    #[must_use]
    pub fn capture(
        candidate_id: &str,
        paper: &ExamPaper,
        session: &ExamSession,
        aggregator: &ViolationAggregator,
    ) -> Option<Self> {
        let submission = session.submission()?;
        let ledger = aggregator.ledger();
        let violation_summary = ledger.summary();

        Some(Self {
            attempt_id: session.attempt_id(),
            candidate_id: candidate_id.to_string(),
            exam_title: paper.title.clone(),
            started_at: session.started_at(),
            submitted_at: submission.submitted_at,
            reason: submission.reason,
            terminated: submission.reason.is_terminated(),
            breach: aggregator.auto_submit(),
            stats: session.stats(),
            sections: session
                .sections()
                .iter()
                .map(|s| SectionReport {
                    name: s.name().to_string(),
                    stats: s.stats(),
                })
                .collect(),
            answers: session
                .answers()
                .into_iter()
                .map(|(question_id, choice)| AnswerRecord {
                    question_id,
                    choice,
                })
                .collect(),
            score: session.score(paper),
            live_indicator: violation_summary.live,
            violation_summary,
            violations: ledger.events().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::paper::fixtures::paper;
    use crate::model::{ProctoringSettings, Severity, ViolationCandidate, ViolationCategory};
    use crate::time::fixed_now;

    #[test]
    fn capture_requires_submission() {
        let paper = paper(1, 2);
        let mut session = ExamSession::start(&paper, AttemptId::generate(), fixed_now()).unwrap();
        let mut aggregator = ViolationAggregator::new(&ProctoringSettings::default());
        aggregator.ingest(ViolationCandidate::new(
            ViolationCategory::FocusLost,
            Severity::High,
            "tab",
            fixed_now(),
        ));

        assert!(SubmissionSnapshot::capture("APP-1", &paper, &session, &aggregator).is_none());

        session.select(Choice::A);
        session.save_and_next();
        session.submit(SubmitReason::ViolationLimit, fixed_now());

        let snapshot = SubmissionSnapshot::capture("APP-1", &paper, &session, &aggregator).unwrap();
        assert!(snapshot.terminated);
        assert_eq!(snapshot.answers.len(), 1);
        assert_eq!(snapshot.score.final_marks, 4);
        assert_eq!(snapshot.live_indicator.tab_switch_count, 1);
        assert_eq!(snapshot.violations.len(), 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["reason"], "violation_limit");
    }
}
