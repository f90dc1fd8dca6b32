//! Event loop that drives one `ProctoredExam`.
//!
//! The session loop is the only writer. Detector tasks and the UI talk to it
//! over channels, and renderers read `ExamSnapshot`s from a `watch` channel.

mod event;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use exam_core::Clock;
use exam_core::model::{SubmissionSnapshot, SubmitReason};
use exam_core::proctoring::{FocusDetector, FocusTransition, SampledDetector};

use crate::error::{RuntimeError, SubmissionError};
use crate::exam::{ExamSnapshot, ProctoredExam};
use crate::submission::{SubmissionEndpoint, SubmissionReceipt};

pub use event::{DetectorEvent, RuntimeCommand};

const EVENT_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 16;
const TIMER_PERIOD: Duration = Duration::from_secs(1);

/// Detectors to run alongside an exam.
#[derive(Default)]
pub struct DetectorSet {
    sampled: Vec<Box<dyn SampledDetector>>,
    focus: Option<FocusDetector>,
}

impl DetectorSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sampled(mut self, detector: Box<dyn SampledDetector>) -> Self {
        self.sampled.push(detector);
        self
    }

    #[must_use]
    pub fn with_focus(mut self, detector: FocusDetector) -> Self {
        self.focus = Some(detector);
        self
    }
}

/// How a runtime ended.
#[derive(Debug)]
pub struct RuntimeOutcome {
    pub snapshot: ExamSnapshot,
    /// Present when the exam was submitted.
    pub submission: Option<SubmissionSnapshot>,
    /// Result of the single delivery attempt, if one was made.
    pub delivery: Option<Result<SubmissionReceipt, SubmissionError>>,
}

/// Spawns the session loop and detector tasks on the current tokio runtime.
pub struct ExamRuntime;

impl ExamRuntime {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn spawn(
        exam: ProctoredExam,
        detectors: DetectorSet,
        endpoint: Arc<dyn SubmissionEndpoint>,
        clock: Clock,
    ) -> RuntimeHandle {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (focus_tx, focus_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(exam.snapshot());

        let mut workers = Vec::with_capacity(detectors.sampled.len() + 1);
        for detector in detectors.sampled {
            workers.push(tokio::spawn(tasks::run_sampled(
                detector,
                clock,
                event_tx.clone(),
                shutdown_tx.subscribe(),
            )));
        }
        if let Some(detector) = detectors.focus {
            workers.push(tokio::spawn(tasks::run_focus(
                detector,
                clock,
                focus_rx,
                event_tx.clone(),
                shutdown_tx.subscribe(),
            )));
        }
        drop(event_tx);

        let session = SessionLoop {
            exam,
            clock,
            events: event_rx,
            commands: command_rx,
            snapshots: snapshot_tx,
            shutdown: shutdown_tx,
            workers,
            endpoint,
        };
        RuntimeHandle {
            commands: command_tx,
            focus: focus_tx,
            snapshots: snapshot_rx,
            task: tokio::spawn(session.run()),
        }
    }
}

/// UI-side handle: issues commands and reads snapshots.
pub struct RuntimeHandle {
    commands: mpsc::Sender<RuntimeCommand>,
    focus: mpsc::Sender<FocusTransition>,
    snapshots: watch::Receiver<ExamSnapshot>,
    task: JoinHandle<RuntimeOutcome>,
}

impl RuntimeHandle {
    /// # Errors
    ///
    /// Returns `RuntimeError::Stopped` once the session loop has ended.
    pub async fn send(&self, command: impl Into<RuntimeCommand>) -> Result<(), RuntimeError> {
        self.commands
            .send(command.into())
            .await
            .map_err(|_| RuntimeError::Stopped)
    }

    /// Forward a platform visibility/focus notification.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Stopped` once the focus detector has ended.
    pub async fn focus(&self, transition: FocusTransition) -> Result<(), RuntimeError> {
        self.focus
            .send(transition)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }

    #[must_use]
    pub fn snapshot(&self) -> ExamSnapshot {
        self.snapshots.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ExamSnapshot> {
        self.snapshots.clone()
    }

    /// Wait for the session loop to finish on its own (submission).
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Join` if the loop panicked.
    pub async fn join(self) -> Result<RuntimeOutcome, RuntimeError> {
        Ok(self.task.await?)
    }

    /// Tear down without submitting and wait for every task to stop. If the
    /// exam was already submitted this just waits for the loop.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Join` if the loop panicked.
    pub async fn shutdown(self) -> Result<RuntimeOutcome, RuntimeError> {
        // A closed channel means the loop is already finishing.
        let _ = self.commands.send(RuntimeCommand::Shutdown).await;
        self.join().await
    }
}

//
// ─── SESSION LOOP ──────────────────────────────────────────────────────────────
//

struct SessionLoop {
    exam: ProctoredExam,
    clock: Clock,
    events: mpsc::Receiver<DetectorEvent>,
    commands: mpsc::Receiver<RuntimeCommand>,
    snapshots: watch::Sender<ExamSnapshot>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    endpoint: Arc<dyn SubmissionEndpoint>,
}

impl SessionLoop {
    async fn run(mut self) -> RuntimeOutcome {
        let mut timer = interval(TIMER_PERIOD);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;
        let mut commands_open = true;

        while !self.exam.is_submitted() {
            tokio::select! {
                _ = timer.tick() => {
                    self.exam.tick(self.clock.now());
                }
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => events_open = false,
                },
                command = self.commands.recv(), if commands_open => match command {
                    Some(RuntimeCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("command channel closed; exam keeps running");
                        commands_open = false;
                    }
                },
            }
            self.snapshots.send_replace(self.exam.snapshot());
        }

        self.teardown().await
    }

    fn handle_event(&mut self, event: DetectorEvent) {
        let now = self.clock.now();
        match event {
            DetectorEvent::Candidate(candidate) => {
                self.exam.ingest(candidate, now);
            }
            DetectorEvent::Observation(observation) => self.exam.observe(observation),
            DetectorEvent::Unavailable { kind, reason } => {
                self.exam.sensor_unavailable(kind, reason);
            }
        }
    }

    fn handle_command(&mut self, command: RuntimeCommand) {
        let now = self.clock.now();
        match command {
            RuntimeCommand::Exam(command) => {
                if let Err(err) = self.exam.command(command, now) {
                    warn!(%err, ?command, "command rejected");
                }
            }
            RuntimeCommand::DismissWarning => {
                self.exam.dismiss_warning();
            }
            RuntimeCommand::Submit => {
                self.exam.submit(SubmitReason::Candidate, now);
            }
            RuntimeCommand::Shutdown => {}
        }
    }

    /// Closes the aggregator, signals detectors, makes the single delivery
    /// attempt, then waits for every detector task.
    async fn teardown(mut self) -> RuntimeOutcome {
        self.exam.close();
        self.shutdown.send_replace(true);
        self.events.close();

        let submission = self.exam.take_submission();
        let delivery = match &submission {
            Some(snapshot) => {
                let result = self.endpoint.submit(snapshot).await;
                if let Err(err) = &result {
                    warn!(%err, attempt_id = %snapshot.attempt_id, "submission delivery failed");
                }
                Some(result)
            }
            None => None,
        };

        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                warn!(%err, "detector task failed");
            }
        }
        let snapshot = self.exam.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        info!(submitted = submission.is_some(), "exam runtime stopped");

        RuntimeOutcome {
            snapshot,
            submission,
            delivery,
        }
    }
}
