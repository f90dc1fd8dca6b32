use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("invalid choice: {0}")]
    InvalidChoice(String),

    #[error("question text cannot be empty")]
    EmptyText,

    #[error("option {0} cannot be empty")]
    EmptyOption(Choice),
}

//
// ─── CHOICE ────────────────────────────────────────────────────────────────────
//

/// One of the four answer options of a multiple-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Choice {
    A,
    B,
    C,
    D,
}

impl Choice {
    pub const ALL: [Choice; 4] = [Choice::A, Choice::B, Choice::C, Choice::D];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Choice::A => 0,
            Choice::B => 1,
            Choice::C => 2,
            Choice::D => 3,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Choice::A => "A",
            Choice::B => "B",
            Choice::C => "C",
            Choice::D => "D",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Choice {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Choice::A),
            "B" | "b" => Ok(Choice::B),
            "C" | "c" => Ok(Choice::C),
            "D" | "d" => Ok(Choice::D),
            other => Err(QuestionError::InvalidChoice(other.to_string())),
        }
    }
}

//
// ─── QUESTION CONTENT ──────────────────────────────────────────────────────────
//

/// Immutable question content, including the answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub number: u32,
    pub text: String,
    pub options: [String; 4],
    pub correct: Choice,
}

impl Question {
    /// Checks that the prompt and every option carry text.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyText` or `QuestionError::EmptyOption`.
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        for choice in Choice::ALL {
            if self.options[choice.index()].trim().is_empty() {
                return Err(QuestionError::EmptyOption(choice));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn option(&self, choice: Choice) -> &str {
        &self.options[choice.index()]
    }
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Palette status of a question during an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionStatus {
    NotVisited,
    Visited,
    Answered,
    Marked,
    MarkedAnswered,
}

impl QuestionStatus {
    #[must_use]
    pub fn is_marked(self) -> bool {
        matches!(self, QuestionStatus::Marked | QuestionStatus::MarkedAnswered)
    }

    #[must_use]
    pub fn has_answer(self) -> bool {
        matches!(
            self,
            QuestionStatus::Answered | QuestionStatus::MarkedAnswered
        )
    }
}

//
// ─── QUESTION STATE ────────────────────────────────────────────────────────────
//

/// Mutable per-question progress.
///
/// `answer` is the committed choice and is `Some` exactly when the status is
/// `Answered` or `MarkedAnswered`. `pending` holds a choice the candidate has
/// selected but not yet saved; it survives navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionState {
    question_id: QuestionId,
    status: QuestionStatus,
    answer: Option<Choice>,
    pending: Option<Choice>,
}

impl QuestionState {
    #[must_use]
    pub fn new(question_id: QuestionId) -> Self {
        Self {
            question_id,
            status: QuestionStatus::NotVisited,
            answer: None,
            pending: None,
        }
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn status(&self) -> QuestionStatus {
        self.status
    }

    /// The committed answer.
    #[must_use]
    pub fn answer(&self) -> Option<Choice> {
        self.answer
    }

    #[must_use]
    pub fn pending(&self) -> Option<Choice> {
        self.pending
    }

    /// The choice a UI should highlight: the pending one, else the committed one.
    #[must_use]
    pub fn displayed_choice(&self) -> Option<Choice> {
        self.pending.or(self.answer)
    }

    pub(crate) fn enter(&mut self) {
        if self.status == QuestionStatus::NotVisited {
            self.status = QuestionStatus::Visited;
        }
    }

    pub(crate) fn select(&mut self, choice: Choice) {
        self.pending = Some(choice);
    }

    /// Saves the pending choice, if any.
    ///
    /// A marked question becomes marked-answered; every other status becomes
    /// answered, which drops the review flag of a marked-answered question.
    pub(crate) fn commit(&mut self) {
        let Some(choice) = self.pending.take().or(self.answer) else {
            return;
        };
        self.answer = Some(choice);
        self.status = match self.status {
            QuestionStatus::Marked => QuestionStatus::MarkedAnswered,
            _ => QuestionStatus::Answered,
        };
    }

    pub(crate) fn clear(&mut self) {
        self.pending = None;
        self.answer = None;
        self.status = match self.status {
            QuestionStatus::Answered => QuestionStatus::Visited,
            QuestionStatus::MarkedAnswered => QuestionStatus::Marked,
            other => other,
        };
    }

    pub(crate) fn mark_for_review(&mut self) {
        match self.pending.take().or(self.answer) {
            Some(choice) => {
                self.answer = Some(choice);
                self.status = QuestionStatus::MarkedAnswered;
            }
            None => self.status = QuestionStatus::Marked,
        }
    }
}
