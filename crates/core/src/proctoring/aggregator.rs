use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::model::{
    ProctoringSettings, ViolationCandidate, ViolationCategory, ViolationEvent, ViolationId,
};
use crate::proctoring::detector::DetectorKind;
use crate::proctoring::escalation::{Breach, EscalationConfig};
use crate::proctoring::ledger::ViolationLedger;

/// Why a candidate was not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Teardown has begun.
    Closed,
    /// A warning is still on screen.
    WarningActive,
    /// Too soon after the last accepted event from the same detector.
    CoolingDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    Accepted {
        id: ViolationId,
        /// Set when this event is the one that breached a limit.
        breach: Option<Breach>,
    },
    Dropped(DropReason),
}

/// Single policy point for candidate violations.
///
/// Owns the ledger, the active-warning slot and the sticky auto-submit flag.
/// Callers feed candidates one at a time, so per-event updates never
/// interleave.
#[derive(Debug, Clone)]
pub struct ViolationAggregator {
    ledger: ViolationLedger,
    escalation: EscalationConfig,
    cooldown: Duration,
    last_accepted: HashMap<DetectorKind, DateTime<Utc>>,
    active_warning: Option<ViolationId>,
    auto_submit: Option<Breach>,
    next_id: u64,
    closed: bool,
}

impl ViolationAggregator {
    #[must_use]
    pub fn new(settings: &ProctoringSettings) -> Self {
        Self::with_policy(*settings.escalation(), settings.cooldown())
    }

    /// Builds an aggregator. A limit of zero is breached immediately.
    #[must_use]
    pub fn with_policy(escalation: EscalationConfig, cooldown: Duration) -> Self {
        let mut aggregator = Self {
            ledger: ViolationLedger::new(),
            escalation,
            cooldown,
            last_accepted: HashMap::new(),
            active_warning: None,
            auto_submit: None,
            next_id: 1,
            closed: false,
        };
        if let Some(breach) = escalation.evaluate(0, aggregator.ledger.counts()) {
            warn!(%breach, "escalation limit is zero; treating as already breached");
            aggregator.auto_submit = Some(breach);
        }
        aggregator
    }

    pub fn ingest(&mut self, candidate: ViolationCandidate) -> Ingest {
        if let Some(reason) = self.drop_reason(&candidate) {
            debug!(category = %candidate.category, ?reason, "violation candidate dropped");
            return Ingest::Dropped(reason);
        }

        let id = ViolationId::new(self.next_id);
        self.next_id += 1;
        self.last_accepted
            .insert(cooldown_key(candidate.category), candidate.observed_at);
        let category = candidate.category;
        self.ledger.record(id, candidate);
        info!(%id, %category, total = self.ledger.total(), "violation recorded");
        self.active_warning = Some(id);

        let breach = self.evaluate();
        Ingest::Accepted { id, breach }
    }

    /// Hides the active warning. Counts and the auto-submit flag are untouched.
    pub fn dismiss_warning(&mut self) -> bool {
        self.active_warning.take().is_some()
    }

    #[must_use]
    pub fn active_warning(&self) -> Option<&ViolationEvent> {
        self.active_warning.and_then(|id| self.ledger.get(id))
    }

    #[must_use]
    pub fn auto_submit(&self) -> Option<Breach> {
        self.auto_submit
    }

    #[must_use]
    pub fn is_auto_submit(&self) -> bool {
        self.auto_submit.is_some()
    }

    #[must_use]
    pub fn ledger(&self) -> &ViolationLedger {
        &self.ledger
    }

    /// Stops accepting candidates. Irreversible.
    pub fn close(&mut self) {
        self.closed = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn drop_reason(&self, candidate: &ViolationCandidate) -> Option<DropReason> {
        if self.closed {
            return Some(DropReason::Closed);
        }
        if self.active_warning.is_some() {
            return Some(DropReason::WarningActive);
        }
        let last = self.last_accepted.get(&cooldown_key(candidate.category))?;
        (candidate.observed_at - *last < self.cooldown).then_some(DropReason::CoolingDown)
    }

    /// Sets the sticky flag on the first breach and returns it; later
    /// evaluations return `None`.
    fn evaluate(&mut self) -> Option<Breach> {
        if self.auto_submit.is_some() {
            return None;
        }
        let breach = self
            .escalation
            .evaluate(self.ledger.total(), self.ledger.counts())?;
        warn!(%breach, "violation limit breached; auto-submit armed");
        self.auto_submit = Some(breach);
        Some(breach)
    }
}

/// Absent and multiple faces come from one camera and share a cooldown, so a
/// flickering face count is not counted twice.
fn cooldown_key(category: ViolationCategory) -> DetectorKind {
    match category {
        ViolationCategory::FaceAbsent | ViolationCategory::FaceMultiple => DetectorKind::Face,
        ViolationCategory::Noise => DetectorKind::Noise,
        ViolationCategory::FocusLost => DetectorKind::Focus,
    }
}
