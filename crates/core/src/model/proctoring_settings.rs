use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::violation::ViolationCategory;
use crate::proctoring::escalation::{CategoryLimits, EscalationConfig};
use crate::time::millis;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProctoringSettingsError {
    #[error("face sample interval must be > 0")]
    InvalidFaceSampleInterval,

    #[error("noise sample interval must be > 0")]
    InvalidNoiseSampleInterval,

    #[error("noise threshold must be a number in [0, 100]")]
    InvalidNoiseThreshold,
}

/// Raw proctoring configuration as loaded from a settings file.
///
/// Missing fields fall back to the defaults below. A per-category limit of
/// `null` means only the global limit applies to that category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctoringSettingsDraft {
    pub face_sample_interval_ms: u64,
    pub noise_sample_interval_ms: u64,
    pub noise_threshold: f32,
    pub noise_sustain_ms: u64,
    pub cooldown_ms: u64,
    pub global_limit: u32,
    pub face_absent_limit: Option<u32>,
    pub face_multiple_limit: Option<u32>,
    pub noise_limit: Option<u32>,
    pub focus_lost_limit: Option<u32>,
}

impl Default for ProctoringSettingsDraft {
    fn default() -> Self {
        Self {
            face_sample_interval_ms: 2_000,
            noise_sample_interval_ms: 16,
            noise_threshold: 65.0,
            noise_sustain_ms: 1_500,
            cooldown_ms: 10_000,
            global_limit: 10,
            face_absent_limit: Some(5),
            face_multiple_limit: Some(3),
            noise_limit: Some(5),
            focus_lost_limit: Some(3),
        }
    }
}

impl ProctoringSettingsDraft {
    /// Validates the draft.
    ///
    /// Zero limits are accepted on purpose: they fail closed and breach at once.
    ///
    /// # Errors
    ///
    /// Returns `ProctoringSettingsError` for zero sampling intervals or a
    /// noise threshold outside `[0, 100]`.
    pub fn validate(self) -> Result<ProctoringSettings, ProctoringSettingsError> {
        if self.face_sample_interval_ms == 0 {
            return Err(ProctoringSettingsError::InvalidFaceSampleInterval);
        }
        if self.noise_sample_interval_ms == 0 {
            return Err(ProctoringSettingsError::InvalidNoiseSampleInterval);
        }
        if !self.noise_threshold.is_finite() || !(0.0..=100.0).contains(&self.noise_threshold) {
            return Err(ProctoringSettingsError::InvalidNoiseThreshold);
        }

        Ok(ProctoringSettings::from_checked(&self))
    }
}

/// Validated proctoring configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProctoringSettings {
    face_sample_interval: std::time::Duration,
    noise_sample_interval: std::time::Duration,
    noise_threshold: f32,
    noise_sustain: Duration,
    cooldown: Duration,
    escalation: EscalationConfig,
}

impl Default for ProctoringSettings {
    fn default() -> Self {
        Self::from_checked(&ProctoringSettingsDraft::default())
    }
}

impl ProctoringSettings {
    fn from_checked(draft: &ProctoringSettingsDraft) -> Self {
        Self {
            face_sample_interval: std::time::Duration::from_millis(draft.face_sample_interval_ms),
            noise_sample_interval: std::time::Duration::from_millis(draft.noise_sample_interval_ms),
            noise_threshold: draft.noise_threshold,
            noise_sustain: millis(draft.noise_sustain_ms),
            cooldown: millis(draft.cooldown_ms),
            escalation: EscalationConfig::new(
                draft.global_limit,
                CategoryLimits {
                    face_absent: draft.face_absent_limit,
                    face_multiple: draft.face_multiple_limit,
                    noise: draft.noise_limit,
                    focus_lost: draft.focus_lost_limit,
                },
            ),
        }
    }

    /// How often the face detector samples a frame.
    #[must_use]
    pub fn face_sample_interval(&self) -> std::time::Duration {
        self.face_sample_interval
    }

    /// How often the noise detector reads an audio buffer.
    #[must_use]
    pub fn noise_sample_interval(&self) -> std::time::Duration {
        self.noise_sample_interval
    }

    /// Normalised level (0-100) above which audio counts as noisy.
    #[must_use]
    pub fn noise_threshold(&self) -> f32 {
        self.noise_threshold
    }

    #[must_use]
    pub fn noise_sustain(&self) -> Duration {
        self.noise_sustain
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    #[must_use]
    pub fn escalation(&self) -> &EscalationConfig {
        &self.escalation
    }

    #[must_use]
    pub fn limit_for(&self, category: ViolationCategory) -> Option<u32> {
        self.escalation.limits().get(category)
    }
}
