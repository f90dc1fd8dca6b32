use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Severity, ViolationCandidate, ViolationCategory};
use crate::proctoring::detector::{
    DetectorKind, Reading, SensorStatus, SignalDetector, mark_unavailable,
};

/// Platform visibility / focus notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusTransition {
    Hidden,
    Visible,
    Blurred,
    Focused,
    FullscreenExited,
}

/// Turns losing transitions into candidates immediately, with no debounce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusDetector {
    status: SensorStatus,
    transitions_seen: u64,
}

impl Default for FocusDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: SensorStatus::Active,
            transitions_seen: 0,
        }
    }

    #[must_use]
    pub fn transitions_seen(&self) -> u64 {
        self.transitions_seen
    }

    pub fn observe(&mut self, transition: FocusTransition, now: DateTime<Utc>) -> Reading {
        if !self.status.is_active() {
            return Reading::Idle;
        }
        self.transitions_seen += 1;

        let (severity, message) = match transition {
            FocusTransition::Visible | FocusTransition::Focused => return Reading::Quiet,
            FocusTransition::Hidden => (
                Severity::High,
                "Tab switch detected! This action has been recorded.",
            ),
            FocusTransition::Blurred => (
                Severity::Medium,
                "Window focus lost! Stay on the exam screen.",
            ),
            FocusTransition::FullscreenExited => (
                Severity::High,
                "Fullscreen exited! Please return to fullscreen.",
            ),
        };
        Reading::Candidate(ViolationCandidate::new(
            ViolationCategory::FocusLost,
            severity,
            message,
            now,
        ))
    }

    /// The notification source went away for good.
    pub fn source_lost(&mut self, reason: impl Into<String>) -> Reading {
        if !self.status.is_active() {
            return Reading::Idle;
        }
        mark_unavailable(&mut self.status, reason.into())
    }
}

impl SignalDetector for FocusDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Focus
    }

    fn status(&self) -> &SensorStatus {
        &self.status
    }

    fn stop(&mut self) {
        if self.status.is_active() {
            self.status = SensorStatus::Stopped;
        }
    }
}
