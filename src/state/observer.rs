//! Read-only, change-notifying view of the workflow state

use tokio::sync::watch;

use super::WorkflowState;

/// Error returned once the owning controller has been dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("workflow controller has been dropped")]
pub struct ControllerGone;

/// Observer handle onto a controller's state.
///
/// Readers never block the workflow task. Intermediate states may be skipped
/// by a slow reader; use the event stream when every transition matters.
#[derive(Debug, Clone)]
pub struct WorkflowObserver {
    rx: watch::Receiver<WorkflowState>,
}

impl WorkflowObserver {
    pub(crate) fn new(rx: watch::Receiver<WorkflowState>) -> Self {
        Self { rx }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> WorkflowState {
        self.rx.borrow().clone()
    }

    /// Wait until the state changes, then return the new value
    pub async fn changed(&mut self) -> Result<WorkflowState, ControllerGone> {
        self.rx.changed().await.map_err(|_| ControllerGone)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Wait until the state satisfies `predicate` (checked immediately first)
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&WorkflowState) -> bool,
    ) -> Result<WorkflowState, ControllerGone> {
        let state = self.rx.wait_for(predicate).await.map_err(|_| ControllerGone)?;
        Ok(state.clone())
    }
}
