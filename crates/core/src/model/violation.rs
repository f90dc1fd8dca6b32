use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::ViolationId;

/// Integrity rule a violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationCategory {
    FaceAbsent,
    FaceMultiple,
    Noise,
    FocusLost,
}

impl ViolationCategory {
    pub const ALL: [ViolationCategory; 4] = [
        ViolationCategory::FaceAbsent,
        ViolationCategory::FaceMultiple,
        ViolationCategory::Noise,
        ViolationCategory::FocusLost,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationCategory::FaceAbsent => "face-absent",
            ViolationCategory::FaceMultiple => "face-multiple",
            ViolationCategory::Noise => "noise",
            ViolationCategory::FocusLost => "focus-lost",
        }
    }

    /// Parses the kebab-case name used in storage.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

/// A detector's proposal; the aggregator decides whether it counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationCandidate {
    pub category: ViolationCategory,
    pub severity: Severity,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

impl ViolationCandidate {
    #[must_use]
    pub fn new(
        category: ViolationCategory,
        severity: Severity,
        message: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            observed_at,
        }
    }
}

/// An accepted violation, kept forever in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub id: ViolationId,
    pub category: ViolationCategory,
    pub severity: Severity,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

/// Accepted-event counts, one field per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub face_absent: u32,
    pub face_multiple: u32,
    pub noise: u32,
    pub focus_lost: u32,
}

impl CategoryCounts {
    #[must_use]
    pub fn get(&self, category: ViolationCategory) -> u32 {
        match category {
            ViolationCategory::FaceAbsent => self.face_absent,
            ViolationCategory::FaceMultiple => self.face_multiple,
            ViolationCategory::Noise => self.noise,
            ViolationCategory::FocusLost => self.focus_lost,
        }
    }

    pub(crate) fn increment(&mut self, category: ViolationCategory) {
        let slot = match category {
            ViolationCategory::FaceAbsent => &mut self.face_absent,
            ViolationCategory::FaceMultiple => &mut self.face_multiple,
            ViolationCategory::Noise => &mut self.noise,
            ViolationCategory::FocusLost => &mut self.focus_lost,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Counters in the shape the exam dashboard shows them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveIndicators {
    pub warning_count: u32,
    pub tab_switch_count: u32,
    pub face_off_count: u32,
    pub noise_detected_count: u32,
}

impl LiveIndicators {
    #[must_use]
    pub fn from_counts(total: u32, counts: &CategoryCounts) -> Self {
        Self {
            warning_count: total,
            tab_switch_count: counts.focus_lost,
            face_off_count: counts.face_absent.saturating_add(counts.face_multiple),
            noise_detected_count: counts.noise,
        }
    }
}
