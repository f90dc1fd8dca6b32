use serde::{Deserialize, Serialize};

use crate::model::{
    CategoryCounts, LiveIndicators, ViolationCandidate, ViolationCategory, ViolationEvent,
    ViolationId,
};

/// Append-only log of accepted violations plus counters derived from it.
///
/// Counters are only touched by `record`, which also appends, so they always
/// equal the filtered and total event counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationLedger {
    events: Vec<ViolationEvent>,
    counts: CategoryCounts,
    total: u32,
}

/// Copy of the ledger counters for snapshots and submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: u32,
    pub counts: CategoryCounts,
    pub live: LiveIndicators,
}

impl ViolationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, id: ViolationId, candidate: ViolationCandidate) {
        self.counts.increment(candidate.category);
        self.total = self.total.saturating_add(1);
        self.events.push(ViolationEvent {
            id,
            category: candidate.category,
            severity: candidate.severity,
            message: candidate.message,
            recorded_at: candidate.observed_at,
        });
    }

    #[must_use]
    pub fn events(&self) -> &[ViolationEvent] {
        &self.events
    }

    #[must_use]
    pub fn get(&self, id: ViolationId) -> Option<&ViolationEvent> {
        self.events.iter().rev().find(|e| e.id == id)
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn count(&self, category: ViolationCategory) -> u32 {
        self.counts.get(category)
    }

    #[must_use]
    pub fn counts(&self) -> &CategoryCounts {
        &self.counts
    }

    #[must_use]
    pub fn summary(&self) -> ViolationSummary {
        ViolationSummary {
            total: self.total,
            counts: self.counts,
            live: LiveIndicators::from_counts(self.total, &self.counts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use crate::time::fixed_now;

    #[test]
    fn counters_match_events() {
        let mut ledger = ViolationLedger::new();
        let categories = [
            ViolationCategory::Noise,
            ViolationCategory::FocusLost,
            ViolationCategory::Noise,
            ViolationCategory::FaceAbsent,
        ];
        for (i, category) in categories.into_iter().enumerate() {
            let candidate = ViolationCandidate::new(category, Severity::Medium, "x", fixed_now());
            ledger.record(ViolationId::new(i as u64 + 1), candidate);
        }

        assert_eq!(ledger.total() as usize, ledger.events().len());
        for category in ViolationCategory::ALL {
            let filtered = ledger
                .events()
                .iter()
                .filter(|e| e.category == category)
                .count();
            assert_eq!(ledger.count(category) as usize, filtered);
        }
        assert_eq!(ledger.summary().live.noise_detected_count, 2);
        assert_eq!(
            ledger.get(ViolationId::new(2)).map(|e| e.category),
            Some(ViolationCategory::FocusLost)
        );
    }
}
