//! voice_workflow: single-flight voice-command workflow controller
//!
//! Sequences permission pre-flight, speech capture, interpretation, and
//! spoken feedback into one cancellable, restartable workflow:
//! - `controller`: the state machine and its run bookkeeping
//! - `state`: workflow states and the read-only observer handle
//! - `services`: collaborator traits and the daemon's local wiring
//! - `ipc`: Unix socket observer surface used by the daemon

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod ipc;
pub mod lifecycle;
pub mod services;
pub mod state;

pub use controller::{ControllerOptions, WorkflowController};
pub use error::{CaptureError, ErrorKind};
pub use events::WorkflowEvent;
pub use services::Services;
pub use state::{WorkflowObserver, WorkflowState};
