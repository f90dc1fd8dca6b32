use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Severity, ViolationCandidate, ViolationCategory};
use crate::proctoring::detector::{
    DetectorKind, Observation, Reading, SampledDetector, SensorStatus, SignalDetector, SourceError,
    mark_unavailable,
};

/// One captured camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Camera handle that can be sampled on demand.
pub trait VideoSource: Send {
    /// # Errors
    ///
    /// `SourceError::Unavailable` once the camera is gone for good.
    fn capture(&mut self) -> Result<VideoFrame, SourceError>;
}

/// Black-box face counter.
pub trait FaceClassifier: Send {
    /// # Errors
    ///
    /// Any failure; transient ones skip the sample, permanent ones disable
    /// the detector. Neither counts as a violation.
    fn count_faces(&mut self, frame: &VideoFrame) -> Result<u32, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub face_count: u32,
    pub checked_at: DateTime<Utc>,
}

impl FaceObservation {
    #[must_use]
    pub fn single_face(&self) -> bool {
        self.face_count == 1
    }
}

/// Samples a frame per activation and flags zero or several faces.
///
/// No smoothing: every out-of-range sample is a candidate, the aggregator's
/// cooldown keeps a long absence from being counted per tick.
pub struct FaceDetector {
    camera: Option<Box<dyn VideoSource>>,
    classifier: Option<Box<dyn FaceClassifier>>,
    interval: std::time::Duration,
    status: SensorStatus,
    last: Option<FaceObservation>,
}

impl FaceDetector {
    #[must_use]
    pub fn new(
        camera: Box<dyn VideoSource>,
        classifier: Box<dyn FaceClassifier>,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            camera: Some(camera),
            classifier: Some(classifier),
            interval,
            status: SensorStatus::Active,
            last: None,
        }
    }

    #[must_use]
    pub fn last_observation(&self) -> Option<FaceObservation> {
        self.last
    }

    fn release(&mut self) {
        self.camera = None;
        self.classifier = None;
    }

    fn fail(&mut self, err: SourceError) -> Reading {
        match err {
            SourceError::Transient(reason) => {
                debug!(%reason, "face sample skipped");
                Reading::Skipped
            }
            SourceError::Unavailable(reason) => {
                warn!(%reason, "face detection unavailable");
                self.release();
                mark_unavailable(&mut self.status, reason)
            }
        }
    }
}

impl SignalDetector for FaceDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Face
    }

    fn status(&self) -> &SensorStatus {
        &self.status
    }

    fn stop(&mut self) {
        self.release();
        if self.status.is_active() {
            self.status = SensorStatus::Stopped;
        }
    }
}

impl SampledDetector for FaceDetector {
    fn sample_interval(&self) -> std::time::Duration {
        self.interval
    }

    fn observation(&self) -> Option<Observation> {
        self.last.map(Observation::Face)
    }

    fn sample(&mut self, now: DateTime<Utc>) -> Reading {
        let (Some(camera), Some(classifier)) = (self.camera.as_mut(), self.classifier.as_mut())
        else {
            return Reading::Idle;
        };

        let counted = camera
            .capture()
            .and_then(|frame| classifier.count_faces(&frame));
        let face_count = match counted {
            Ok(count) => count,
            Err(err) => return self.fail(err),
        };

        self.last = Some(FaceObservation {
            face_count,
            checked_at: now,
        });

        match face_count {
            0 => Reading::Candidate(ViolationCandidate::new(
                ViolationCategory::FaceAbsent,
                Severity::Medium,
                "No face detected. Please ensure your face is visible to the camera.",
                now,
            )),
            1 => Reading::Quiet,
            n => Reading::Candidate(ViolationCandidate::new(
                ViolationCategory::FaceMultiple,
                Severity::High,
                format!("Multiple faces ({n}) detected. Only the candidate should be visible."),
                now,
            )),
        }
    }
}
