use serde::{Deserialize, Serialize};

use crate::model::paper::PaperSection;
use crate::model::question::{QuestionState, QuestionStatus};

/// Count of questions per status within one section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionStats {
    pub total: usize,
    pub not_visited: usize,
    pub visited: usize,
    pub answered: usize,
    pub marked: usize,
    pub marked_answered: usize,
}

impl SectionStats {
    fn count(&mut self, status: QuestionStatus) {
        self.total += 1;
        match status {
            QuestionStatus::NotVisited => self.not_visited += 1,
            QuestionStatus::Visited => self.visited += 1,
            QuestionStatus::Answered => self.answered += 1,
            QuestionStatus::Marked => self.marked += 1,
            QuestionStatus::MarkedAnswered => self.marked_answered += 1,
        }
    }
}

/// Ordered questions of one named section plus its remembered cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    name: String,
    questions: Vec<QuestionState>,
    cursor: usize,
}

impl Section {
    pub(crate) fn from_paper(section: &PaperSection) -> Self {
        Self {
            name: section.name.clone(),
            questions: section
                .questions
                .iter()
                .map(|q| QuestionState::new(q.id))
                .collect(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn questions(&self) -> &[QuestionState] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn current(&self) -> &QuestionState {
        &self.questions[self.cursor]
    }

    #[must_use]
    pub fn is_at_first(&self) -> bool {
        self.cursor == 0
    }

    #[must_use]
    pub fn is_at_last(&self) -> bool {
        self.cursor + 1 >= self.questions.len()
    }

    #[must_use]
    pub fn stats(&self) -> SectionStats {
        let mut stats = SectionStats::default();
        for question in &self.questions {
            stats.count(question.status());
        }
        stats
    }

    pub(crate) fn current_mut(&mut self) -> &mut QuestionState {
        &mut self.questions[self.cursor]
    }

    /// Moves the cursor and visits the target. Caller guarantees `index` is in range.
    pub(crate) fn move_to(&mut self, index: usize) {
        self.cursor = index;
        self.current_mut().enter();
    }
}
