//! Workflow state and its derived predicates

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// The canonical state of one voice-interaction surface.
///
/// Exactly one variant is current at a time. Text payloads belong to the
/// running workflow and are dropped whenever the state returns to `Idle`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "payload", rename_all = "snake_case")]
pub enum WorkflowState {
    /// No workflow in progress
    #[default]
    Idle,
    /// Permission check/request in flight
    AwaitingPermission,
    /// Capture active, carrying the latest partial transcript
    Listening(String),
    /// Final transcript handed to the language action service
    Interpreting(String),
    /// Action succeeded, spoken feedback in flight
    Responding(String),
    /// Workflow finished successfully
    Completed(String),
    /// A stage failed; needs `stop`/`reset` to return to `Idle`
    Failed(ErrorKind),
}

impl WorkflowState {
    /// True while a workflow occupies the controller
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            WorkflowState::Idle | WorkflowState::Completed(_) | WorkflowState::Failed(_)
        )
    }

    /// Whether `start_workflow` may begin a new run from here.
    ///
    /// `Failed` is excluded: a failure has to be acknowledged first.
    pub fn can_start(&self) -> bool {
        matches!(self, WorkflowState::Idle | WorkflowState::Completed(_))
    }

    /// Whether a stop request must end capture immediately
    pub fn should_stop_on_request(&self) -> bool {
        matches!(self, WorkflowState::Listening(_))
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, WorkflowState::Idle)
    }

    /// `Completed` or `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed(_) | WorkflowState::Failed(_))
    }

    /// Text payload carried by the current variant, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            WorkflowState::Listening(text)
            | WorkflowState::Interpreting(text)
            | WorkflowState::Responding(text)
            | WorkflowState::Completed(text) => Some(text),
            _ => None,
        }
    }

    /// Failure reason when `Failed`
    pub fn failure(&self) -> Option<&ErrorKind> {
        match self {
            WorkflowState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Stable label for logs and UI, independent of the payload
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::AwaitingPermission => "awaiting_permission",
            WorkflowState::Listening(_) => "listening",
            WorkflowState::Interpreting(_) => "interpreting",
            WorkflowState::Responding(_) => "responding",
            WorkflowState::Completed(_) => "completed",
            WorkflowState::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "Idle"),
            WorkflowState::AwaitingPermission => write!(f, "AwaitingPermission"),
            WorkflowState::Listening(text) => write!(f, "Listening({text:?})"),
            WorkflowState::Interpreting(text) => write!(f, "Interpreting({text:?})"),
            WorkflowState::Responding(text) => write!(f, "Responding({text:?})"),
            WorkflowState::Completed(text) => write!(f, "Completed({text:?})"),
            WorkflowState::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}
