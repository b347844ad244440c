//! Deadline for workflows whose collaborators never answer
//!
//! The controller imposes no timeouts itself. This task sits outside it,
//! watching the observer handle, and stops a generation that stays active
//! past the deadline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::controller::WorkflowController;

/// Watch `controller` until this task is aborted.
///
/// Each generation gets its own deadline, so a stop followed by a start
/// between two wakeups still restarts the clock.
pub async fn run(controller: Arc<WorkflowController>, deadline: Duration) {
    let mut observer = controller.observer();

    loop {
        if observer.wait_for(|s| s.is_active()).await.is_err() {
            return;
        }
        let generation = controller.generation();
        debug!(generation, ?deadline, "watchdog armed");

        let expiry = tokio::time::sleep(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                changed = observer.changed() => {
                    let Ok(state) = changed else {
                        return;
                    };
                    if !state.is_active() || controller.generation() != generation {
                        break;
                    }
                }
                _ = &mut expiry => {
                    if controller.generation() == generation && controller.state().is_active() {
                        warn!(
                            generation,
                            state = %controller.state().label(),
                            deadline_secs = deadline.as_secs(),
                            "workflow exceeded deadline, stopping"
                        );
                        controller.stop_workflow();
                    }
                    break;
                }
            }
        }
    }
}
