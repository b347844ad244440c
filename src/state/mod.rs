//! Workflow state module
//!
//! Provides the closed set of workflow states:
//! - Idle: resting state, no workflow in progress
//! - AwaitingPermission: permission check or request in flight
//! - Listening / Interpreting / Responding: active stages carrying text
//! - Completed / Failed: end of a run, waiting for restart or reset

mod observer;
mod workflow;

pub use observer::{ControllerGone, WorkflowObserver};
pub use workflow::WorkflowState;
