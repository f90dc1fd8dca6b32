//! Drift-tolerant exam countdown.
//!
//! Remaining time is always recomputed from the anchor and the current
//! timestamp, never decremented, so a late or skipped poll self-corrects.

use chrono::{DateTime, Utc};
use tracing::info;

/// Remaining time below which the countdown is shown as running low.
pub const LOW_TIME_THRESHOLD_SECS: u32 = 600;

/// Result of polling the timer once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub remaining_secs: u32,
    /// True only on the poll that first observed zero.
    pub expired_now: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamTimer {
    duration_secs: u32,
    anchored_at: DateTime<Utc>,
    remaining_secs: u32,
    expired: bool,
}

impl ExamTimer {
    /// Starts a countdown of `duration_secs` anchored at `anchored_at`.
    #[must_use]
    pub fn start(duration_secs: u32, anchored_at: DateTime<Utc>) -> Self {
        Self {
            duration_secs,
            anchored_at,
            remaining_secs: duration_secs,
            expired: false,
        }
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    #[must_use]
    pub fn anchored_at(&self) -> DateTime<Utc> {
        self.anchored_at
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    #[must_use]
    pub fn is_running_low(&self) -> bool {
        self.remaining_secs < LOW_TIME_THRESHOLD_SECS
    }

    /// Remaining time as `HH:MM:SS`.
    #[must_use]
    pub fn formatted(&self) -> String {
        format_hms(self.remaining_secs)
    }

    /// Recomputes remaining time for `now`.
    ///
    /// Remaining never increases between anchors: a clock that steps backwards
    /// leaves the last observed value in place.
    pub fn poll(&mut self, now: DateTime<Utc>) -> TimerTick {
        let computed = self.compute_remaining(now);
        self.remaining_secs = self.remaining_secs.min(computed);

        let expired_now = self.remaining_secs == 0 && !self.expired;
        if expired_now {
            self.expired = true;
            info!(anchored_at = %self.anchored_at, "exam timer expired");
        }

        TimerTick {
            remaining_secs: self.remaining_secs,
            expired_now,
        }
    }

    /// Moves the anchor, e.g. after restoring a session.
    ///
    /// Ignored once the timer has expired; expiry is one-shot.
    pub fn reanchor(&mut self, anchored_at: DateTime<Utc>, now: DateTime<Utc>) {
        if self.expired {
            return;
        }
        self.anchored_at = anchored_at;
        self.remaining_secs = self.duration_secs;
        self.poll(now);
    }

    fn compute_remaining(&self, now: DateTime<Utc>) -> u32 {
        let elapsed = (now - self.anchored_at).num_seconds();
        if elapsed <= 0 {
            return self.duration_secs;
        }
        let remaining = i64::from(self.duration_secs) - elapsed;
        u32::try_from(remaining.max(0)).unwrap_or(0)
    }
}

/// Formats seconds as zero-padded `HH:MM:SS`.
#[must_use]
pub fn format_hms(total_secs: u32) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}
