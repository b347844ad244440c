//! Workflow controller
//!
//! Owns the canonical [`WorkflowState`], runs at most one workflow at a time,
//! and linearizes cancellation against in-flight collaborator callbacks with
//! a generation token. Every state write goes through [`Shared::transition`]
//! (or one of its siblings) while holding the run slot lock, so a transition
//! and its generation check are applied atomically.

mod workflow;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::WorkflowEvent;
use crate::services::Services;
use crate::state::{WorkflowObserver, WorkflowState};

const EVENT_CAPACITY: usize = 64;

/// Behaviour switches for a controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Speak the result before completing
    pub feedback_enabled: bool,
    /// How long `Completed` stays before reverting to `Idle` on its own
    pub completed_hold: Option<Duration>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            feedback_enabled: true,
            completed_hold: Some(Duration::from_millis(1500)),
        }
    }
}

/// Bookkeeping for the current run, guarded by one lock
#[derive(Default)]
struct RunSlot {
    generation: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl RunSlot {
    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|t| t.elapsed().as_millis().try_into().unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

pub(crate) struct Shared {
    services: Services,
    options: ControllerOptions,
    state_tx: watch::Sender<WorkflowState>,
    event_tx: broadcast::Sender<WorkflowEvent>,
    slot: Mutex<RunSlot>,
}

/// Single-instance controller for one voice-interaction surface
pub struct WorkflowController {
    shared: Arc<Shared>,
}

impl WorkflowController {
    /// Create a controller in `Idle` with the given collaborators
    pub fn new(services: Services, options: ControllerOptions) -> Self {
        let (state_tx, _) = watch::channel(WorkflowState::Idle);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                services,
                options,
                state_tx,
                event_tx,
                slot: Mutex::new(RunSlot::default()),
            }),
        }
    }

    /// Read-only, change-notifying view of the state
    pub fn observer(&self) -> WorkflowObserver {
        WorkflowObserver::new(self.shared.state_tx.subscribe())
    }

    /// Ordered stream of transition events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> WorkflowState {
        self.shared.state_tx.borrow().clone()
    }

    /// Current generation token
    pub fn generation(&self) -> u64 {
        self.shared.lock_slot().generation
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.shared.options
    }

    /// Begin a new workflow.
    ///
    /// Returns `false` without touching anything when the current state
    /// cannot start (a workflow is running, or a failure is unacknowledged).
    pub fn start_workflow(&self) -> bool {
        let mut slot = self.shared.lock_slot();

        let current = self.shared.state_tx.borrow().clone();
        if !current.can_start() {
            debug!(state = %current.label(), "start ignored, workflow cannot start");
            return false;
        }

        // A Completed run may still hold its auto-revert timer
        if let Some(cancel) = slot.cancel.take() {
            cancel.cancel();
        }

        slot.generation += 1;
        slot.started_at = Some(Instant::now());
        let generation = slot.generation;
        let cancel = CancellationToken::new();
        slot.cancel = Some(cancel.clone());

        self.shared.apply(&slot, WorkflowState::AwaitingPermission);

        let shared = Arc::clone(&self.shared);
        slot.task = Some(tokio::spawn(workflow::run(shared, generation, cancel)));

        true
    }

    /// Abort whatever is running and return to `Idle`.
    ///
    /// Never produces `Failed`. Returns `false` when already `Idle`.
    pub fn stop_workflow(&self) -> bool {
        self.shared.unwind("stop requested")
    }

    /// Acknowledge a finished or failed workflow and return to `Idle`.
    ///
    /// From an active state this behaves like [`Self::stop_workflow`].
    pub fn reset(&self) -> bool {
        self.shared.unwind("reset requested")
    }

    /// Cancel any in-flight workflow and wait for its task to finish.
    ///
    /// Must be called from within a tokio runtime, like every entry point.
    pub async fn shutdown(&self) {
        self.shared.unwind("controller shutting down");

        let task = self.shared.lock_slot().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!(?e, "workflow task ended abnormally");
            }
        }
    }
}

impl Drop for WorkflowController {
    fn drop(&mut self) {
        self.shared.unwind("controller dropped");
    }
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, RunSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> WorkflowState {
        self.state_tx.borrow().clone()
    }

    /// Replace the state and emit its event. Caller holds the slot lock.
    fn apply(&self, slot: &RunSlot, next: WorkflowState) {
        let prev = self.state_tx.send_replace(next.clone());

        info!(
            from = %prev.label(),
            to = %next.label(),
            generation = slot.generation,
            "workflow transition"
        );

        if let Some(event) =
            WorkflowEvent::for_transition(&prev, &next, slot.generation, slot.elapsed_ms())
        {
            debug!(%event, "emitting workflow event");
            let _ = self.event_tx.send(event);
        }
    }

    /// Apply `next` if `generation` is still current
    pub(crate) fn transition(&self, generation: u64, next: WorkflowState) -> bool {
        let slot = self.lock_slot();
        if slot.generation != generation {
            debug!(
                generation,
                current = slot.generation,
                to = %next.label(),
                "dropping stale transition"
            );
            return false;
        }

        self.apply(&slot, next);
        true
    }

    /// Replace the partial transcript; only valid while listening
    pub(crate) fn update_partial(&self, generation: u64, text: String) -> bool {
        let slot = self.lock_slot();
        if slot.generation != generation {
            debug!(generation, current = slot.generation, "dropping stale partial transcript");
            return false;
        }

        match self.current() {
            WorkflowState::Listening(ref prev) if *prev == text => true,
            WorkflowState::Listening(_) => {
                self.apply(&slot, WorkflowState::Listening(text));
                true
            }
            other => {
                debug!(state = %other.label(), "partial transcript outside listening");
                false
            }
        }
    }

    /// Emit an event that has no state change, if `generation` is current
    pub(crate) fn emit(&self, generation: u64, event: WorkflowEvent) {
        let slot = self.lock_slot();
        if slot.generation == generation {
            debug!(%event, "emitting workflow event");
            let _ = self.event_tx.send(event);
        }
    }

    /// Stop capture for `generation`; a superseded run must leave a newer
    /// run's capture session alone
    pub(crate) fn stop_capture(&self, generation: u64) -> bool {
        let slot = self.lock_slot();
        if slot.generation != generation {
            debug!(generation, current = slot.generation, "dropping stale capture stop");
            return false;
        }

        self.services.capture.stop();
        true
    }

    /// Return to `Idle` from `Completed` when the hold expires
    pub(crate) fn revert_completed(&self, generation: u64) -> bool {
        let slot = self.lock_slot();
        if slot.generation != generation || !matches!(self.current(), WorkflowState::Completed(_)) {
            return false;
        }

        self.apply(&slot, WorkflowState::Idle);
        true
    }

    /// Invalidate the current run and settle in `Idle`
    fn unwind(&self, reason: &'static str) -> bool {
        let mut slot = self.lock_slot();
        let current = self.current();

        // Idle never has a run in flight: start leaves Idle under this lock
        if current.is_idle() {
            return false;
        }

        if current.should_stop_on_request() {
            self.services.capture.stop();
        }

        if let Some(cancel) = slot.cancel.take() {
            cancel.cancel();
        }
        slot.generation += 1;

        info!(reason, state = %current.label(), generation = slot.generation, "unwinding workflow");

        self.apply(&slot, WorkflowState::Idle);
        slot.started_at = None;
        true
    }
}
