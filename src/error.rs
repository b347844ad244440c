//! Failure taxonomy surfaced to observers
//!
//! Collaborator errors are re-mapped into [`ErrorKind`] at the controller
//! boundary. Cancellation is not a failure and has no variant here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a workflow ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ErrorKind {
    /// One or more required capabilities were refused
    #[error("required permissions were denied")]
    PermissionDenied,

    /// Capture/transcription engine is not available in this session
    #[error("speech capture is unavailable")]
    CaptureUnavailable,

    /// Capture started but failed mid-stream
    #[error("speech capture failed: {0}")]
    CaptureError(String),

    /// Capture finished without any recognized speech
    #[error("no speech was recognized")]
    EmptyTranscript,

    /// The language action service reported an error
    #[error("interpretation failed: {0}")]
    InterpretationFailed(String),
}

/// Workflow stage a failure originated from (diagnostics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Permission,
    Capture,
    Interpretation,
}

impl ErrorKind {
    /// Stage that produced this failure
    pub fn stage(&self) -> FailureStage {
        match self {
            ErrorKind::PermissionDenied => FailureStage::Permission,
            ErrorKind::CaptureUnavailable
            | ErrorKind::CaptureError(_)
            | ErrorKind::EmptyTranscript => FailureStage::Capture,
            ErrorKind::InterpretationFailed(_) => FailureStage::Interpretation,
        }
    }

    /// Whether the user can fix this themselves (e.g. by opening settings)
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, ErrorKind::PermissionDenied)
    }

    /// Map an interpretation-stage collaborator error
    pub fn interpretation(err: &anyhow::Error) -> Self {
        // `{:#}` keeps the context chain on one line
        ErrorKind::InterpretationFailed(format!("{err:#}"))
    }
}

/// Errors reported by a speech capture service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Recognizer or audio input is not available
    #[error("speech recognizer unavailable")]
    Unavailable,

    /// The audio session could not be started or was interrupted
    #[error("audio session failure: {0}")]
    AudioSession(String),

    /// Transcription failed after capture started
    #[error("transcription failed: {0}")]
    Transcription(String),
}

impl From<CaptureError> for ErrorKind {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Unavailable => ErrorKind::CaptureUnavailable,
            other => ErrorKind::CaptureError(other.to_string()),
        }
    }
}
