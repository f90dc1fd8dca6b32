use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{CategoryCounts, ViolationCategory};

/// Optional per-category limits. `None` leaves a category to the global limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimits {
    pub face_absent: Option<u32>,
    pub face_multiple: Option<u32>,
    pub noise: Option<u32>,
    pub focus_lost: Option<u32>,
}

impl CategoryLimits {
    #[must_use]
    pub fn get(&self, category: ViolationCategory) -> Option<u32> {
        match category {
            ViolationCategory::FaceAbsent => self.face_absent,
            ViolationCategory::FaceMultiple => self.face_multiple,
            ViolationCategory::Noise => self.noise,
            ViolationCategory::FocusLost => self.focus_lost,
        }
    }
}

/// Threshold that ended the exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Breach {
    Global {
        total: u32,
        limit: u32,
    },
    Category {
        category: ViolationCategory,
        count: u32,
        limit: u32,
    },
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Breach::Global { total, limit } => {
                write!(f, "{total} violations reached the limit of {limit}")
            }
            Breach::Category {
                category,
                count,
                limit,
            } => write!(f, "{count} {category} violations reached the limit of {limit}"),
        }
    }
}

/// Per-category and global escalation limits.
///
/// A count breaches when it is `>=` its limit, so a limit of 0 is breached
/// before any violation is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationConfig {
    global_limit: u32,
    limits: CategoryLimits,
}

impl EscalationConfig {
    #[must_use]
    pub fn new(global_limit: u32, limits: CategoryLimits) -> Self {
        Self {
            global_limit,
            limits,
        }
    }

    #[must_use]
    pub fn global_limit(&self) -> u32 {
        self.global_limit
    }

    #[must_use]
    pub fn limits(&self) -> &CategoryLimits {
        &self.limits
    }

    /// Returns the first breached threshold, checking the global limit first.
    #[must_use]
    pub fn evaluate(&self, total: u32, counts: &CategoryCounts) -> Option<Breach> {
        if total >= self.global_limit {
            return Some(Breach::Global {
                total,
                limit: self.global_limit,
            });
        }
        ViolationCategory::ALL.into_iter().find_map(|category| {
            let limit = self.limits.get(category)?;
            let count = counts.get(category);
            (count >= limit).then_some(Breach::Category {
                category,
                count,
                limit,
            })
        })
    }
}
