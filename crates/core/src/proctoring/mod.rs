//! Behavioural-integrity monitoring: detectors propose violations, the
//! aggregator is the single place that decides what counts, and escalation
//! turns accumulated counts into a forced submission.

pub mod aggregator;
pub mod detector;
pub mod escalation;
pub mod face;
pub mod focus;
pub mod ledger;
pub mod noise;

pub use aggregator::{DropReason, Ingest, ViolationAggregator};
pub use detector::{
    DetectorKind, Observation, Reading, SampledDetector, SensorStatus, SignalDetector,
    SourceError, SustainWindow,
};
pub use escalation::{Breach, CategoryLimits, EscalationConfig};
pub use face::{FaceClassifier, FaceDetector, FaceObservation, VideoFrame, VideoSource};
pub use focus::{FocusDetector, FocusTransition};
pub use ledger::{ViolationLedger, ViolationSummary};
pub use noise::{AudioSource, NoiseDetector, NoiseObservation, normalized_level, samples_from_bytes};
