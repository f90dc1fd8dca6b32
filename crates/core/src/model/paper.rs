use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::{Choice, Question, QuestionError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PaperError {
    #[error("exam paper has no sections")]
    NoSections,

    #[error("section {0:?} has no questions")]
    EmptySection(String),

    #[error("section name cannot be empty")]
    EmptySectionName,

    #[error("duplicate question id {0}")]
    DuplicateQuestion(QuestionId),

    #[error("exam duration must be > 0")]
    InvalidDuration,

    #[error("question {id}: {source}")]
    Question {
        id: QuestionId,
        #[source]
        source: QuestionError,
    },
}

/// Points awarded per correct answer and deducted per wrong one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkingScheme {
    pub correct: i32,
    pub wrong: i32,
}

impl Default for MarkingScheme {
    fn default() -> Self {
        Self {
            correct: 4,
            wrong: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperSection {
    pub name: String,
    pub questions: Vec<Question>,
}

/// Question content and answer key for one exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamPaper {
    pub title: String,
    pub duration_secs: u32,
    #[serde(default)]
    pub marking: MarkingScheme,
    pub sections: Vec<PaperSection>,
}

impl ExamPaper {
    /// Checks structural rules: at least one section, no empty sections,
    /// unique question ids and well-formed questions.
    ///
    /// # Errors
    ///
    /// Returns the first `PaperError` found.
    pub fn validate(&self) -> Result<(), PaperError> {
        if self.duration_secs == 0 {
            return Err(PaperError::InvalidDuration);
        }
        if self.sections.is_empty() {
            return Err(PaperError::NoSections);
        }

        let mut seen = HashSet::new();
        for section in &self.sections {
            if section.name.trim().is_empty() {
                return Err(PaperError::EmptySectionName);
            }
            if section.questions.is_empty() {
                return Err(PaperError::EmptySection(section.name.clone()));
            }
            for question in &section.questions {
                question.validate().map_err(|source| PaperError::Question {
                    id: question.id,
                    source,
                })?;
                if !seen.insert(question.id) {
                    return Err(PaperError::DuplicateQuestion(question.id));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.sections.iter().map(|s| s.questions.len()).sum()
    }

    /// Correct choice for a question id, if the paper contains it.
    #[must_use]
    pub fn correct_choice(&self, id: QuestionId) -> Option<Choice> {
        self.sections
            .iter()
            .flat_map(|s| s.questions.iter())
            .find(|q| q.id == id)
            .map(|q| q.correct)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Builds a paper with `sections` sections of `per_section` questions each.
    /// Every question's correct answer is `A`.
    pub(crate) fn paper(sections: usize, per_section: usize) -> ExamPaper {
        let mut next_id = 1_u64;
        let sections = (0..sections)
            .map(|s| PaperSection {
                name: format!("Section {}", s + 1),
                questions: (0..per_section)
                    .map(|q| {
                        let id = next_id;
                        next_id += 1;
                        Question {
                            id: QuestionId::new(id),
                            number: u32::try_from(q + 1).unwrap(),
                            text: format!("Question {id}"),
                            options: ["a".into(), "b".into(), "c".into(), "d".into()],
                            correct: Choice::A,
                        }
                    })
                    .collect(),
            })
            .collect();

        ExamPaper {
            title: "Fixture".into(),
            duration_secs: 1800,
            marking: MarkingScheme::default(),
            sections,
        }
    }
}
