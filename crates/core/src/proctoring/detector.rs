use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ViolationCandidate;
use crate::proctoring::face::FaceObservation;
use crate::proctoring::noise::NoiseObservation;

/// Failure reported by an external sensor or classifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SourceError {
    /// Permission denied or revoked, device gone. Never retried.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// A single read failed; the next activation may succeed.
    #[error("transient source failure: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Face,
    Noise,
    Focus,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectorKind::Face => "face",
            DetectorKind::Noise => "noise",
            DetectorKind::Focus => "focus",
        })
    }
}

/// Persistent health of a detector's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SensorStatus {
    Active,
    Unavailable { reason: String },
    Stopped,
}

impl SensorStatus {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, SensorStatus::Active)
    }
}

/// Outcome of one detector activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    /// Source read, nothing out of range.
    Quiet,
    Candidate(ViolationCandidate),
    /// Transient failure; the sample was dropped.
    Skipped,
    /// The source just became permanently unavailable. Reported once.
    Unavailable(String),
    /// The detector is unavailable or stopped and did not touch its source.
    Idle,
}

/// Latest raw measurement of a sampled detector, for live indicators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Face(FaceObservation),
    Noise(NoiseObservation),
}

impl Observation {
    /// True when `other` reports the same face count or noisy flag.
    /// Timestamps and exact levels are ignored.
    #[must_use]
    pub fn same_state(&self, other: &Observation) -> bool {
        match (self, other) {
            (Observation::Face(a), Observation::Face(b)) => a.face_count == b.face_count,
            (Observation::Noise(a), Observation::Noise(b)) => a.is_noisy == b.is_noisy,
            _ => false,
        }
    }
}

/// Common surface of every detector.
pub trait SignalDetector: Send {
    fn kind(&self) -> DetectorKind;

    fn status(&self) -> &SensorStatus;

    /// Halts the detector and releases its source handle. Later activations
    /// return `Reading::Idle`.
    fn stop(&mut self);
}

/// A detector that reads its source on a fixed cadence.
pub trait SampledDetector: SignalDetector {
    fn sample_interval(&self) -> std::time::Duration;

    /// Reads the source once and emits at most one candidate.
    fn sample(&mut self, now: DateTime<Utc>) -> Reading;

    fn observation(&self) -> Option<Observation>;
}

/// Tracks how long a condition has held without interruption.
///
/// `observe` returns true once the condition has held for at least
/// `minimum`; any observation where it does not hold resets the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SustainWindow {
    minimum: Duration,
    since: Option<DateTime<Utc>>,
}

impl SustainWindow {
    #[must_use]
    pub fn new(minimum: Duration) -> Self {
        Self {
            minimum,
            since: None,
        }
    }

    pub fn observe(&mut self, holds: bool, now: DateTime<Utc>) -> bool {
        if !holds {
            self.since = None;
            return false;
        }
        let since = *self.since.get_or_insert(now);
        now - since >= self.minimum
    }

    /// Forgets the current run; the next holding observation starts a new one.
    pub fn reset(&mut self) {
        self.since = None;
    }

    #[must_use]
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }
}

/// Shared bookkeeping for translating a permanent source failure into a
/// one-time `Reading::Unavailable` and a sticky status.
pub(crate) fn mark_unavailable(status: &mut SensorStatus, reason: String) -> Reading {
    *status = SensorStatus::Unavailable {
        reason: reason.clone(),
    };
    Reading::Unavailable(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn sustain_window_requires_continuous_hold() {
        let start = fixed_now();
        let mut window = SustainWindow::new(Duration::milliseconds(1_500));

        assert!(!window.observe(true, start));
        assert!(!window.observe(true, start + Duration::milliseconds(1_000)));
        assert!(!window.observe(false, start + Duration::milliseconds(1_100)));
        assert!(!window.observe(true, start + Duration::milliseconds(1_200)));
        assert!(!window.observe(true, start + Duration::milliseconds(2_600)));
        assert!(window.observe(true, start + Duration::milliseconds(2_700)));
    }

    #[test]
    fn zero_window_fires_on_first_hold() {
        let mut window = SustainWindow::new(Duration::zero());
        assert!(window.observe(true, fixed_now()));
        window.reset();
        assert_eq!(window.since(), None);
    }

    #[test]
    fn observation_state_ignores_timestamps_and_levels() {
        let now = fixed_now();
        let loud = |level: f32, at| {
            Observation::Noise(NoiseObservation {
                level,
                is_noisy: level > 65.0,
                measured_at: at,
            })
        };
        assert!(loud(80.0, now).same_state(&loud(95.0, now + Duration::seconds(1))));
        assert!(!loud(80.0, now).same_state(&loud(10.0, now)));

        let faces = |face_count| {
            Observation::Face(FaceObservation {
                face_count,
                checked_at: now,
            })
        };
        assert!(faces(1).same_state(&faces(1)));
        assert!(!faces(1).same_state(&faces(2)));
        assert!(!faces(1).same_state(&loud(80.0, now)));
    }
}
