use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{Severity, ViolationCandidate, ViolationCategory};
use crate::proctoring::detector::{
    DetectorKind, Observation, Reading, SampledDetector, SensorStatus, SignalDetector, SourceError,
    SustainWindow, mark_unavailable,
};

/// Microphone handle that returns one buffer of time-domain samples in
/// `[-1.0, 1.0]` per read.
pub trait AudioSource: Send {
    /// # Errors
    ///
    /// `SourceError::Unavailable` once the microphone is gone for good.
    fn read(&mut self) -> Result<Vec<f32>, SourceError>;
}

/// RMS energy of a buffer scaled to 0-100, or `None` for a corrupt buffer
/// (NaN or infinite samples).
#[must_use]
pub fn normalized_level(samples: &[f32]) -> Option<f32> {
    if samples.is_empty() {
        return Some(0.0);
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    #[allow(clippy::cast_precision_loss)]
    let rms = (sum / samples.len() as f32).sqrt();
    rms.is_finite().then(|| (rms * 200.0).min(100.0))
}

/// Converts unsigned 8-bit time-domain bytes (silence at 128) to samples.
#[must_use]
pub fn samples_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .iter()
        .map(|b| (f32::from(*b) - 128.0) / 128.0)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseObservation {
    pub level: f32,
    pub is_noisy: bool,
    pub measured_at: DateTime<Utc>,
}

/// Flags noise that stays above the threshold for the whole sustain window.
///
/// After emitting, the window restarts, so a continuous noise produces at
/// most one candidate per window length.
pub struct NoiseDetector {
    microphone: Option<Box<dyn AudioSource>>,
    interval: std::time::Duration,
    threshold: f32,
    window: SustainWindow,
    status: SensorStatus,
    last: Option<NoiseObservation>,
}

impl NoiseDetector {
    #[must_use]
    pub fn new(
        microphone: Box<dyn AudioSource>,
        interval: std::time::Duration,
        threshold: f32,
        sustain: Duration,
    ) -> Self {
        Self {
            microphone: Some(microphone),
            interval,
            threshold,
            window: SustainWindow::new(sustain),
            status: SensorStatus::Active,
            last: None,
        }
    }

    #[must_use]
    pub fn last_observation(&self) -> Option<NoiseObservation> {
        self.last
    }

    /// Feeds one level reading through the sustain window.
    pub fn observe_level(&mut self, level: f32, now: DateTime<Utc>) -> Reading {
        let is_noisy = level > self.threshold;
        self.last = Some(NoiseObservation {
            level,
            is_noisy,
            measured_at: now,
        });

        if !self.window.observe(is_noisy, now) {
            return Reading::Quiet;
        }
        self.window.reset();
        Reading::Candidate(ViolationCandidate::new(
            ViolationCategory::Noise,
            Severity::Medium,
            "Excessive noise detected. Please maintain silence during the examination.",
            now,
        ))
    }
}

impl SignalDetector for NoiseDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Noise
    }

    fn status(&self) -> &SensorStatus {
        &self.status
    }

    fn stop(&mut self) {
        self.microphone = None;
        self.window.reset();
        if self.status.is_active() {
            self.status = SensorStatus::Stopped;
        }
    }
}

impl SampledDetector for NoiseDetector {
    fn sample_interval(&self) -> std::time::Duration {
        self.interval
    }

    fn observation(&self) -> Option<Observation> {
        self.last.map(Observation::Noise)
    }

    fn sample(&mut self, now: DateTime<Utc>) -> Reading {
        let Some(microphone) = self.microphone.as_mut() else {
            return Reading::Idle;
        };
        match microphone.read() {
            Ok(samples) => match normalized_level(&samples) {
                Some(level) => self.observe_level(level, now),
                None => {
                    // Continuity is unknown across a bad buffer.
                    debug!("corrupt audio buffer skipped");
                    self.window.reset();
                    Reading::Skipped
                }
            },
            Err(SourceError::Transient(reason)) => {
                debug!(%reason, "audio sample skipped");
                Reading::Skipped
            }
            Err(SourceError::Unavailable(reason)) => {
                warn!(%reason, "noise detection unavailable");
                self.microphone = None;
                self.window.reset();
                mark_unavailable(&mut self.status, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    struct ConstantMic(f32);

    impl AudioSource for ConstantMic {
        fn read(&mut self) -> Result<Vec<f32>, SourceError> {
            Ok(vec![self.0; 64])
        }
    }

    fn detector(amplitude: f32) -> NoiseDetector {
        NoiseDetector::new(
            Box::new(ConstantMic(amplitude)),
            std::time::Duration::from_millis(16),
            65.0,
            Duration::milliseconds(1_500),
        )
    }

    fn candidates_over(detector: &mut NoiseDetector, millis_total: i64, step_ms: i64) -> usize {
        let start = fixed_now();
        (0..=millis_total / step_ms)
            .map(|i| detector.sample(start + Duration::milliseconds(i * step_ms)))
            .filter(|r| matches!(r, Reading::Candidate(_)))
            .count()
    }

    #[test]
    fn level_is_scaled_rms() {
        assert!((normalized_level(&[0.25; 8]).unwrap() - 50.0).abs() < 1e-4);
        assert!((normalized_level(&[1.0; 8]).unwrap() - 100.0).abs() < 1e-4);
        assert_eq!(normalized_level(&[]), Some(0.0));
        assert_eq!(normalized_level(&[0.1, f32::NAN]), None);
        assert_eq!(normalized_level(&[f32::INFINITY; 4]), None);
        assert_eq!(samples_from_bytes(&[128, 0]), vec![0.0, -1.0]);
    }

    #[test]
    fn short_spike_is_not_a_violation() {
        let mut detector = detector(0.5);
        // 1.0 s of noise against a 1.5 s window.
        assert_eq!(candidates_over(&mut detector, 1_000, 16), 0);
        assert!(detector.last_observation().is_some_and(|o| o.is_noisy));
    }

    #[test]
    fn continuous_noise_emits_once_per_window() {
        let mut detector = detector(0.5);
        // 5 s at ~60 samples per second.
        let emitted = candidates_over(&mut detector, 5_000, 16);
        assert!((1..=3).contains(&emitted), "emitted {emitted}");
    }

    #[test]
    fn drop_below_threshold_resets_window() {
        let mut detector = detector(0.0);
        let start = fixed_now();
        assert_eq!(detector.observe_level(80.0, start), Reading::Quiet);
        assert_eq!(
            detector.observe_level(80.0, start + Duration::milliseconds(1_400)),
            Reading::Quiet
        );
        assert_eq!(
            detector.observe_level(10.0, start + Duration::milliseconds(1_450)),
            Reading::Quiet
        );
        assert_eq!(
            detector.observe_level(80.0, start + Duration::milliseconds(1_600)),
            Reading::Quiet
        );
        assert!(matches!(
            detector.observe_level(80.0, start + Duration::milliseconds(3_100)),
            Reading::Candidate(_)
        ));
    }

    #[test]
    fn corrupt_buffers_are_skipped_not_counted() {
        let mut detector = detector(f32::NAN);
        // 3 s of NaN reads, twice the sustain window.
        let start = fixed_now();
        for i in 0..=3_000 / 16 {
            let reading = detector.sample(start + Duration::milliseconds(i * 16));
            assert_eq!(reading, Reading::Skipped);
        }
        assert!(detector.last_observation().is_none());
        assert!(detector.status().is_active());
    }

    #[test]
    fn quiet_room_never_emits() {
        let mut detector = detector(0.05);
        assert_eq!(candidates_over(&mut detector, 5_000, 16), 0);
    }
}
