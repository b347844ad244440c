//! Collaborator seams consumed by the workflow controller
//!
//! Speech capture, language understanding, speech output, and the
//! permission mechanism live outside this crate; the controller only sees
//! these traits. Every long-running call receives the run's cancellation
//! token and is expected to abandon its work once it fires.

pub mod local;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CaptureError;

/// Grant status of each capability a workflow needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    /// Microphone capture
    pub microphone: bool,
    /// Speech transcription
    pub speech_recognition: bool,
    /// Executing the interpreted action (e.g. task-list access)
    pub actions: bool,
}

impl PermissionStatus {
    pub fn all() -> Self {
        Self {
            microphone: true,
            speech_recognition: true,
            actions: true,
        }
    }

    pub fn all_granted(&self) -> bool {
        self.microphone && self.speech_recognition && self.actions
    }
}

#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Current grant status, without prompting
    fn status(&self) -> PermissionStatus;

    fn currently_granted(&self) -> bool {
        self.status().all_granted()
    }

    /// Request every capability; returns the overall grant result
    async fn request_all(&self) -> bool;
}

/// One item of a capture's transcript stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// In-progress text that may still change
    Partial(String),
    /// Final text; nothing follows it
    Final(String),
}

/// Transcript stream handed back by [`SpeechCapture::start`]
pub type TranscriptStream = mpsc::Receiver<Result<TranscriptEvent, CaptureError>>;

#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Start capture and transcription
    async fn start(&self, cancel: CancellationToken) -> Result<TranscriptStream, CaptureError>;

    /// Stop capture. Idempotent, safe when not started.
    fn stop(&self);
}

#[async_trait]
pub trait LanguageAction: Send + Sync {
    /// Interpret recognized text, returning the result to present
    async fn process(&self, text: &str, cancel: CancellationToken) -> anyhow::Result<String>;
}

#[async_trait]
pub trait SpeechFeedback: Send + Sync {
    async fn speak(&self, text: &str, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// The four collaborators a controller is constructed with
#[derive(Clone)]
pub struct Services {
    pub permissions: Arc<dyn PermissionGate>,
    pub capture: Arc<dyn SpeechCapture>,
    pub action: Arc<dyn LanguageAction>,
    pub feedback: Arc<dyn SpeechFeedback>,
}
