//! Events module for workflow transitions
//!
//! Every state change the controller applies is mirrored as one or more
//! structured events, broadcast in the order the transitions happened.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::state::WorkflowState;

/// Events emitted by the workflow controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A new workflow began (entered AwaitingPermission)
    Started { generation: u64 },

    /// Permissions were missing and have been requested
    PermissionRequested,

    /// Capture began with an empty transcript
    ListeningStarted,

    /// Partial transcript updated while listening
    PartialTranscript { text: String },

    /// Final transcript handed to the language action service
    Interpreting { text: String },

    /// Spoken feedback started
    Responding { text: String },

    /// Spoken feedback failed; the workflow still completes
    FeedbackFailed { message: String },

    /// Workflow finished successfully
    Completed {
        result: String,
        /// Duration in milliseconds since the workflow started
        duration_ms: u64,
    },

    /// Workflow failed
    Failed {
        reason: ErrorKind,
        /// Duration in milliseconds since the workflow started
        duration_ms: u64,
    },

    /// An active workflow was stopped on request
    Cancelled {
        /// Duration in milliseconds since the workflow started
        duration_ms: u64,
    },

    /// A finished or failed workflow was cleared back to Idle
    Reset,
}

impl WorkflowEvent {
    /// Event describing entry into `next` from `prev`, if that transition has one
    pub(crate) fn for_transition(
        prev: &WorkflowState,
        next: &WorkflowState,
        generation: u64,
        duration_ms: u64,
    ) -> Option<Self> {
        let event = match next {
            WorkflowState::Idle if prev.is_active() => WorkflowEvent::Cancelled { duration_ms },
            WorkflowState::Idle if prev.is_terminal() => WorkflowEvent::Reset,
            WorkflowState::Idle => return None,
            WorkflowState::AwaitingPermission => WorkflowEvent::Started { generation },
            WorkflowState::Listening(text) => match prev {
                WorkflowState::Listening(_) => WorkflowEvent::PartialTranscript { text: text.clone() },
                _ => WorkflowEvent::ListeningStarted,
            },
            WorkflowState::Interpreting(text) => WorkflowEvent::Interpreting { text: text.clone() },
            WorkflowState::Responding(text) => WorkflowEvent::Responding { text: text.clone() },
            WorkflowState::Completed(result) => WorkflowEvent::Completed {
                result: result.clone(),
                duration_ms,
            },
            WorkflowState::Failed(reason) => WorkflowEvent::Failed {
                reason: reason.clone(),
                duration_ms,
            },
        };
        Some(event)
    }
}

impl std::fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowEvent::Started { generation } => write!(f, "STARTED (generation {})", generation),
            WorkflowEvent::PermissionRequested => write!(f, "PERMISSION_REQUESTED"),
            WorkflowEvent::ListeningStarted => write!(f, "LISTENING_STARTED"),
            WorkflowEvent::PartialTranscript { text } => write!(f, "PARTIAL_TRANSCRIPT {:?}", text),
            WorkflowEvent::Interpreting { text } => write!(f, "INTERPRETING {:?}", text),
            WorkflowEvent::Responding { text } => write!(f, "RESPONDING {:?}", text),
            WorkflowEvent::FeedbackFailed { message } => write!(f, "FEEDBACK_FAILED ({})", message),
            WorkflowEvent::Completed { duration_ms, .. } => {
                write!(f, "COMPLETED ({}ms)", duration_ms)
            }
            WorkflowEvent::Failed { reason, duration_ms } => {
                write!(f, "FAILED: {} ({}ms)", reason, duration_ms)
            }
            WorkflowEvent::Cancelled { duration_ms } => write!(f, "CANCELLED ({}ms)", duration_ms),
            WorkflowEvent::Reset => write!(f, "RESET"),
        }
    }
}
