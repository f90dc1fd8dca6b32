use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use exam_core::Clock;
use exam_core::proctoring::{
    DetectorKind, FocusDetector, FocusTransition, Observation, Reading, SampledDetector,
    SignalDetector,
};

use super::event::DetectorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sent {
    Delivered,
    /// The queue was full; the event is lost.
    Dropped,
    Closed,
}

/// Forwards one reading. Returns false once the task should end.
fn forward(
    kind: DetectorKind,
    reading: Reading,
    events: &mpsc::Sender<DetectorEvent>,
) -> bool {
    let event = match reading {
        Reading::Quiet | Reading::Skipped => return true,
        Reading::Idle => return false,
        Reading::Candidate(candidate) => DetectorEvent::Candidate(candidate),
        Reading::Unavailable(reason) => {
            send(events, DetectorEvent::Unavailable { kind, reason });
            return false;
        }
    };
    send(events, event) != Sent::Closed
}

/// Sends `observation` unless the session loop already has the same state.
/// `published` only moves once the loop has it. Returns false once the loop
/// is gone.
fn publish(
    published: &mut Option<Observation>,
    observation: Observation,
    events: &mpsc::Sender<DetectorEvent>,
) -> bool {
    if published.is_some_and(|p| p.same_state(&observation)) {
        return true;
    }
    match send(events, DetectorEvent::Observation(observation)) {
        Sent::Delivered => {
            *published = Some(observation);
            true
        }
        Sent::Dropped => true,
        Sent::Closed => false,
    }
}

/// Never blocks: a detector must not stall on a busy session loop.
fn send(events: &mpsc::Sender<DetectorEvent>, event: DetectorEvent) -> Sent {
    match events.try_send(event) {
        Ok(()) => Sent::Delivered,
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(?event, "detector event dropped; session loop is busy");
            Sent::Dropped
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Sent::Closed,
    }
}

/// Samples `detector` on its interval until shutdown, unavailability or a
/// closed session loop. The source handle is released before returning.
pub(crate) async fn run_sampled(
    mut detector: Box<dyn SampledDetector>,
    clock: Clock,
    events: mpsc::Sender<DetectorEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let kind = detector.kind();
    let mut ticker = interval(detector.sample_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut published: Option<Observation> = None;

    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let reading = detector.sample(clock.now());

                if let Some(observation) = detector.observation() {
                    if !publish(&mut published, observation, &events) {
                        break;
                    }
                }
                if !forward(kind, reading, &events) {
                    break;
                }
            }
        }
    }

    detector.stop();
    debug!(%kind, "detector task stopped");
}

/// Turns focus transitions into candidates until shutdown or until the
/// transition source is dropped.
pub(crate) async fn run_focus(
    mut detector: FocusDetector,
    clock: Clock,
    mut transitions: mpsc::Receiver<FocusTransition>,
    events: mpsc::Sender<DetectorEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = transitions.recv() => {
                let reading = match next {
                    Some(transition) => detector.observe(transition, clock.now()),
                    None => detector.source_lost("focus notifications closed"),
                };
                if !forward(DetectorKind::Focus, reading, &events) {
                    break;
                }
            }
        }
    }

    detector.stop();
    transitions.close();
    debug!(kind = %DetectorKind::Focus, "detector task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::proctoring::FaceObservation;
    use exam_core::time::fixed_now;

    fn faces(count: u32) -> Observation {
        Observation::Face(FaceObservation {
            face_count: count,
            checked_at: fixed_now(),
        })
    }

    #[test]
    fn observation_dropped_on_full_queue_is_resent() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(DetectorEvent::Observation(faces(1))).unwrap();
        let mut published = None;

        assert!(publish(&mut published, faces(2), &tx));
        assert_eq!(published, None);

        rx.try_recv().unwrap();
        assert!(publish(&mut published, faces(2), &tx));
        assert_eq!(published, Some(faces(2)));
        assert_eq!(rx.try_recv().unwrap(), DetectorEvent::Observation(faces(2)));

        // Same state is not sent again.
        assert!(publish(&mut published, faces(2), &tx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_loop_ends_publishing() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut published = None;
        assert!(!publish(&mut published, faces(0), &tx));
        assert_eq!(published, None);
    }
}
