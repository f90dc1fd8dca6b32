use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::ids::{AttemptId, QuestionId};
use crate::model::paper::{ExamPaper, MarkingScheme, PaperError};
use crate::model::question::{Choice, QuestionState, QuestionStatus};
use crate::model::section::{Section, SectionStats};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error(transparent)]
    Paper(#[from] PaperError),

    #[error("section index {index} out of range (sections: {len})")]
    SectionOutOfRange { index: usize, len: usize },

    #[error("question index {index} out of range (questions in section: {len})")]
    QuestionOutOfRange { index: usize, len: usize },
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

/// Candidate-issued command against the exam progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExamCommand {
    Select(Choice),
    SaveAndNext,
    ClearResponse,
    MarkForReview,
    Previous,
    /// Jump to a question index within the current section.
    JumpTo(usize),
    ChangeSection(usize),
}

/// Whether a command changed anything.
///
/// Commands that arrive after submission are `Ignored`, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    Ignored,
}

/// Why an exam was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    /// The candidate confirmed submission.
    Candidate,
    TimeExpired,
    /// Escalation policy terminated the exam.
    ViolationLimit,
}

impl SubmitReason {
    #[must_use]
    pub fn is_forced(self) -> bool {
        !matches!(self, SubmitReason::Candidate)
    }

    #[must_use]
    pub fn is_terminated(self) -> bool {
        matches!(self, SubmitReason::ViolationLimit)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitReason::Candidate => "candidate",
            SubmitReason::TimeExpired => "time_expired",
            SubmitReason::ViolationLimit => "violation_limit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub reason: SubmitReason,
    pub submitted_at: DateTime<Utc>,
}

/// Position of the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub section: usize,
    pub question: usize,
}

//
// ─── STATS ─────────────────────────────────────────────────────────────────────
//

/// Exam-wide answer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamStats {
    pub total: usize,
    pub answered: usize,
    pub not_answered: usize,
    pub marked: usize,
    pub not_visited: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub correct: usize,
    pub wrong: usize,
    pub unanswered: usize,
    pub final_marks: i64,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Progress of one exam attempt: sections, cursor, submission state.
///
/// Frozen once submitted; every later command is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSession {
    attempt_id: AttemptId,
    sections: Vec<Section>,
    current: usize,
    started_at: DateTime<Utc>,
    submission: Option<Submission>,
}

impl ExamSession {
    /// Starts an attempt for a paper and visits its first question.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Paper` if the paper fails validation.
    pub fn start(
        paper: &ExamPaper,
        attempt_id: AttemptId,
        started_at: DateTime<Utc>,
    ) -> Result<Self, ExamError> {
        paper.validate()?;
        let mut sections: Vec<Section> = paper.sections.iter().map(Section::from_paper).collect();
        sections[0].move_to(0);

        Ok(Self {
            attempt_id,
            sections,
            current: 0,
            started_at,
            submission: None,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[must_use]
    pub fn current_section(&self) -> &Section {
        &self.sections[self.current]
    }

    #[must_use]
    pub fn current_question(&self) -> &QuestionState {
        self.current_section().current()
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        Cursor {
            section: self.current,
            question: self.current_section().cursor(),
        }
    }

    #[must_use]
    pub fn submission(&self) -> Option<Submission> {
        self.submission
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submission.is_some()
    }

    /// True at the first question of the first section; `Previous` is a no-op here.
    #[must_use]
    pub fn is_first_question(&self) -> bool {
        self.current == 0 && self.current_section().is_at_first()
    }

    /// True at the last question of the last section.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current + 1 == self.sections.len() && self.current_section().is_at_last()
    }

    /// Applies a command.
    ///
    /// # Errors
    ///
    /// Returns `ExamError` only for out-of-range jump or section targets.
    pub fn apply(&mut self, command: ExamCommand) -> Result<CommandOutcome, ExamError> {
        if self.is_submitted() {
            debug!(?command, "ignoring command after submission");
            return Ok(CommandOutcome::Ignored);
        }

        match command {
            ExamCommand::Select(choice) => self.current_mut().select(choice),
            ExamCommand::SaveAndNext => {
                self.current_mut().commit();
                self.advance();
            }
            ExamCommand::ClearResponse => self.current_mut().clear(),
            ExamCommand::MarkForReview => {
                self.current_mut().mark_for_review();
                self.advance();
            }
            ExamCommand::Previous => self.retreat(),
            ExamCommand::JumpTo(index) => {
                let len = self.current_section().len();
                if index >= len {
                    return Err(ExamError::QuestionOutOfRange { index, len });
                }
                self.sections[self.current].move_to(index);
            }
            ExamCommand::ChangeSection(index) => {
                let len = self.sections.len();
                if index >= len {
                    return Err(ExamError::SectionOutOfRange { index, len });
                }
                self.current = index;
                let section = &mut self.sections[index];
                let cursor = section.cursor();
                section.move_to(cursor);
            }
        }
        Ok(CommandOutcome::Applied)
    }

    pub fn select(&mut self, choice: Choice) -> CommandOutcome {
        self.apply_infallible(ExamCommand::Select(choice))
    }

    pub fn save_and_next(&mut self) -> CommandOutcome {
        self.apply_infallible(ExamCommand::SaveAndNext)
    }

    pub fn clear_response(&mut self) -> CommandOutcome {
        self.apply_infallible(ExamCommand::ClearResponse)
    }

    pub fn mark_for_review(&mut self) -> CommandOutcome {
        self.apply_infallible(ExamCommand::MarkForReview)
    }

    pub fn previous(&mut self) -> CommandOutcome {
        self.apply_infallible(ExamCommand::Previous)
    }

    /// # Errors
    ///
    /// Returns `ExamError::QuestionOutOfRange` for an index outside the current section.
    pub fn jump_to(&mut self, index: usize) -> Result<CommandOutcome, ExamError> {
        self.apply(ExamCommand::JumpTo(index))
    }

    /// # Errors
    ///
    /// Returns `ExamError::SectionOutOfRange` for an unknown section index.
    pub fn change_section(&mut self, index: usize) -> Result<CommandOutcome, ExamError> {
        self.apply(ExamCommand::ChangeSection(index))
    }

    /// Freezes the session. Returns `false` if it was already submitted.
    pub fn submit(&mut self, reason: SubmitReason, at: DateTime<Utc>) -> bool {
        if self.is_submitted() {
            return false;
        }
        self.submission = Some(Submission {
            reason,
            submitted_at: at,
        });
        true
    }

    #[must_use]
    pub fn section_stats(&self) -> Vec<SectionStats> {
        self.sections.iter().map(Section::stats).collect()
    }

    #[must_use]
    pub fn stats(&self) -> ExamStats {
        let mut stats = ExamStats::default();
        for question in self.questions() {
            stats.total += 1;
            let status = question.status();
            if status == QuestionStatus::NotVisited {
                stats.not_visited += 1;
                continue;
            }
            if status.is_marked() {
                stats.marked += 1;
            }
            if question.answer().is_some() {
                stats.answered += 1;
            }
        }
        stats.not_answered = stats.total - stats.answered - stats.not_visited;
        stats
    }

    /// Committed answers in paper order.
    #[must_use]
    pub fn answers(&self) -> Vec<(QuestionId, Choice)> {
        self.questions()
            .filter_map(|q| q.answer().map(|choice| (q.question_id(), choice)))
            .collect()
    }

    /// Scores committed answers against the paper's answer key.
    #[must_use]
    pub fn score(&self, paper: &ExamPaper) -> ScoreCard {
        let MarkingScheme { correct, wrong } = paper.marking;
        let mut card = ScoreCard::default();
        for question in self.questions() {
            match (question.answer(), paper.correct_choice(question.question_id())) {
                (Some(given), Some(key)) if given == key => card.correct += 1,
                (Some(_), _) => card.wrong += 1,
                (None, _) => card.unanswered += 1,
            }
        }
        let as_i64 = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        card.final_marks = as_i64(card.correct)
            .saturating_mul(i64::from(correct))
            .saturating_add(as_i64(card.wrong).saturating_mul(i64::from(wrong)));
        card
    }

    fn questions(&self) -> impl Iterator<Item = &QuestionState> {
        self.sections.iter().flat_map(|s| s.questions().iter())
    }

    fn apply_infallible(&mut self, command: ExamCommand) -> CommandOutcome {
        self.apply(command).unwrap_or(CommandOutcome::Ignored)
    }

    fn current_mut(&mut self) -> &mut QuestionState {
        self.sections[self.current].current_mut()
    }

    /// Forward-only: stays put at the last question of the last section.
    fn advance(&mut self) {
        let section = &mut self.sections[self.current];
        if !section.is_at_last() {
            let next = section.cursor() + 1;
            section.move_to(next);
        } else if self.current + 1 < self.sections.len() {
            self.current += 1;
            self.sections[self.current].move_to(0);
        }
    }

    fn retreat(&mut self) {
        let section = &mut self.sections[self.current];
        if !section.is_at_first() {
            let prev = section.cursor() - 1;
            section.move_to(prev);
        } else if self.current > 0 {
            self.current -= 1;
            let section = &mut self.sections[self.current];
            let last = section.len() - 1;
            section.move_to(last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::paper::fixtures::paper;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn session(sections: usize, per_section: usize) -> ExamSession {
        ExamSession::start(
            &paper(sections, per_section),
            AttemptId::generate(),
            fixed_now(),
        )
        .unwrap()
    }

    fn status(session: &ExamSession, section: usize, question: usize) -> QuestionStatus {
        session.sections()[section].questions()[question].status()
    }

    #[test]
    fn start_visits_first_question_only() {
        let session = session(2, 2);
        assert_eq!(status(&session, 0, 0), QuestionStatus::Visited);
        assert_eq!(status(&session, 0, 1), QuestionStatus::NotVisited);
        assert!(session.is_first_question());
        assert!(!session.is_last_question());
    }

    #[test]
    fn two_by_two_walkthrough() {
        let mut session = session(2, 2);

        session.select(Choice::B);
        session.save_and_next();
        assert_eq!(status(&session, 0, 0), QuestionStatus::Answered);
        assert_eq!(session.cursor(), Cursor { section: 0, question: 1 });
        assert_eq!(status(&session, 0, 1), QuestionStatus::Visited);

        session.mark_for_review();
        assert_eq!(status(&session, 0, 1), QuestionStatus::Marked);
        assert_eq!(session.cursor(), Cursor { section: 1, question: 0 });

        let stats = session.section_stats();
        assert_eq!(stats[0].answered, 1);
        assert_eq!(stats[0].marked, 1);
        assert_eq!(stats[1].visited, 1);
        assert_eq!(stats[1].not_visited, 1);
    }

    #[test]
    fn previous_then_save_and_next_round_trips() {
        let mut session = session(2, 3);
        session.save_and_next();
        session.save_and_next();
        session.save_and_next();
        let before = session.cursor();
        assert_eq!(before, Cursor { section: 1, question: 0 });

        session.previous();
        assert_eq!(session.cursor(), Cursor { section: 0, question: 2 });
        session.save_and_next();
        assert_eq!(session.cursor(), before);
    }

    #[test]
    fn previous_is_noop_at_global_first() {
        let mut session = session(2, 2);
        session.previous();
        assert_eq!(session.cursor(), Cursor { section: 0, question: 0 });
    }

    #[test]
    fn advance_does_not_wrap_past_last_section() {
        let mut session = session(2, 1);
        session.save_and_next();
        assert!(session.is_last_question());
        session.select(Choice::C);
        session.save_and_next();
        assert_eq!(session.cursor(), Cursor { section: 1, question: 0 });
        assert_eq!(status(&session, 1, 0), QuestionStatus::Answered);
    }

    #[test]
    fn section_cursor_is_remembered() {
        let mut session = session(2, 3);
        session.jump_to(2).unwrap();
        session.change_section(1).unwrap();
        assert_eq!(session.cursor(), Cursor { section: 1, question: 0 });
        assert_eq!(status(&session, 1, 0), QuestionStatus::Visited);

        session.change_section(0).unwrap();
        assert_eq!(session.cursor(), Cursor { section: 0, question: 2 });
    }

    #[test]
    fn out_of_range_targets_are_errors() {
        let mut session = session(2, 2);
        assert_eq!(
            session.jump_to(5),
            Err(ExamError::QuestionOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(
            session.change_section(2),
            Err(ExamError::SectionOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn status_never_returns_to_not_visited() {
        let mut session = session(2, 3);
        let commands = [
            ExamCommand::Select(Choice::A),
            ExamCommand::SaveAndNext,
            ExamCommand::ClearResponse,
            ExamCommand::MarkForReview,
            ExamCommand::Previous,
            ExamCommand::Previous,
            ExamCommand::ClearResponse,
            ExamCommand::JumpTo(2),
            ExamCommand::ChangeSection(1),
            ExamCommand::Select(Choice::D),
            ExamCommand::MarkForReview,
            ExamCommand::ClearResponse,
            ExamCommand::Previous,
        ];

        let mut seen: Vec<Vec<bool>> = Vec::new();
        for command in commands {
            session.apply(command).unwrap();
            let visited: Vec<bool> = session
                .sections()
                .iter()
                .flat_map(|s| s.questions().iter())
                .map(|q| q.status() != QuestionStatus::NotVisited)
                .collect();
            if let Some(last) = seen.last() {
                for (was, now) in last.iter().zip(&visited) {
                    assert!(!*was || *now, "a visited question regressed");
                }
            }
            seen.push(visited);
        }
    }

    #[test]
    fn answer_is_present_iff_status_has_answer() {
        let mut session = session(1, 3);
        session.select(Choice::B);
        session.mark_for_review();
        session.select(Choice::C);
        session.previous();
        session.clear_response();
        session.save_and_next();
        session.save_and_next();

        for question in session.sections()[0].questions() {
            assert_eq!(question.answer().is_some(), question.status().has_answer());
        }
    }

    #[test]
    fn commands_after_submit_are_ignored() {
        let mut session = session(2, 2);
        assert!(session.submit(SubmitReason::TimeExpired, fixed_now()));
        let frozen = session.clone();

        assert_eq!(session.select(Choice::A), CommandOutcome::Ignored);
        assert_eq!(session.save_and_next(), CommandOutcome::Ignored);
        assert_eq!(session.jump_to(99), Ok(CommandOutcome::Ignored));
        assert!(!session.submit(
            SubmitReason::Candidate,
            fixed_now() + Duration::seconds(5)
        ));
        assert_eq!(session, frozen);
    }

    #[test]
    fn stats_and_score_follow_committed_answers() {
        let mut session = session(2, 2);
        session.select(Choice::A);
        session.save_and_next();
        session.select(Choice::B);
        session.mark_for_review();
        // Pending but unsaved selection is not an answer.
        session.select(Choice::A);

        let stats = session.stats();
        assert_eq!(
            stats,
            ExamStats {
                total: 4,
                answered: 2,
                not_answered: 1,
                marked: 1,
                not_visited: 1,
            }
        );

        let score = session.score(&paper(2, 2));
        assert_eq!(score.correct, 1);
        assert_eq!(score.wrong, 1);
        assert_eq!(score.unanswered, 2);
        assert_eq!(score.final_marks, 3);
        assert_eq!(session.answers().len(), 2);
    }
}
