//! Scripted collaborators for controller tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use super::{
    LanguageAction, PermissionGate, PermissionStatus, Services, SpeechCapture, SpeechFeedback,
    TranscriptEvent, TranscriptStream,
};
use crate::error::CaptureError;

pub(crate) struct ScriptedPermissions {
    pub granted: bool,
    pub grant_on_request: bool,
    pub requests: AtomicUsize,
}

impl ScriptedPermissions {
    pub fn granted() -> Self {
        Self {
            granted: true,
            grant_on_request: true,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn on_request(grant: bool) -> Self {
        Self {
            granted: false,
            grant_on_request: grant,
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PermissionGate for ScriptedPermissions {
    fn status(&self) -> PermissionStatus {
        if self.granted {
            PermissionStatus::all()
        } else {
            PermissionStatus {
                microphone: true,
                ..PermissionStatus::default()
            }
        }
    }

    async fn request_all(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.grant_on_request
    }
}

/// Sender side of a scripted transcript stream
pub(crate) type TranscriptFeed = mpsc::Sender<Result<TranscriptEvent, CaptureError>>;

/// Capture whose streams are queued up front; each `start` takes the next
#[derive(Default)]
pub(crate) struct ScriptedCapture {
    streams: Mutex<VecDeque<Result<TranscriptStream, CaptureError>>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl ScriptedCapture {
    /// Queue a live stream and return its feed
    pub fn feed(&self) -> TranscriptFeed {
        let (tx, rx) = mpsc::channel(16);
        self.streams.lock().unwrap().push_back(Ok(rx));
        tx
    }

    /// Queue a stream that yields `events` and then stays open
    pub fn script(&self, events: Vec<Result<TranscriptEvent, CaptureError>>) -> TranscriptFeed {
        let feed = self.feed();
        for event in events {
            feed.try_send(event).unwrap();
        }
        feed
    }

    /// Queue a failure from `start`
    pub fn fail_start(&self, err: CaptureError) {
        self.streams.lock().unwrap().push_back(Err(err));
    }
}

#[async_trait]
impl SpeechCapture for ScriptedCapture {
    async fn start(&self, _cancel: CancellationToken) -> Result<TranscriptStream, CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let next = self.streams.lock().unwrap().pop_front();
        next.unwrap_or(Err(CaptureError::Unavailable))
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Action service returning a fixed outcome.
///
/// With `hold` set, each call waits for a `notify_one` before answering and
/// ignores cancellation, so a test can deliver a late result.
pub(crate) struct ScriptedAction {
    outcome: Result<String, String>,
    pub calls: AtomicUsize,
    pub hold: Option<Arc<Notify>>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedAction {
    pub fn ok(result: &str) -> Self {
        Self {
            outcome: Ok(result.to_owned()),
            calls: AtomicUsize::new(0),
            hold: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn err(message: &str) -> Self {
        Self {
            outcome: Err(message.to_owned()),
            ..Self::ok("")
        }
    }

    pub fn held(result: &str, release: Arc<Notify>) -> Self {
        Self {
            hold: Some(release),
            ..Self::ok(result)
        }
    }
}

#[async_trait]
impl LanguageAction for ScriptedAction {
    async fn process(&self, text: &str, _cancel: CancellationToken) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(text.to_owned());
        if let Some(release) = &self.hold {
            release.notified().await;
        }
        self.outcome.clone().map_err(|message| anyhow::anyhow!(message))
    }
}

pub(crate) struct ScriptedFeedback {
    pub fail: bool,
    pub spoken: Mutex<Vec<String>>,
}

impl ScriptedFeedback {
    pub fn ok() -> Self {
        Self {
            fail: false,
            spoken: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::ok()
        }
    }
}

#[async_trait]
impl SpeechFeedback for ScriptedFeedback {
    async fn speak(&self, text: &str, _cancel: CancellationToken) -> anyhow::Result<()> {
        self.spoken.lock().unwrap().push(text.to_owned());
        if self.fail {
            anyhow::bail!("audio output device unavailable");
        }
        Ok(())
    }
}

/// Concrete handles to the doubles wired into a [`Services`]
pub(crate) struct Doubles {
    pub permissions: Arc<ScriptedPermissions>,
    pub capture: Arc<ScriptedCapture>,
    pub action: Arc<ScriptedAction>,
    pub feedback: Arc<ScriptedFeedback>,
}

impl Doubles {
    pub fn new(permissions: ScriptedPermissions, action: ScriptedAction) -> Self {
        Self {
            permissions: Arc::new(permissions),
            capture: Arc::new(ScriptedCapture::default()),
            action: Arc::new(action),
            feedback: Arc::new(ScriptedFeedback::ok()),
        }
    }

    pub fn with_feedback(mut self, feedback: ScriptedFeedback) -> Self {
        self.feedback = Arc::new(feedback);
        self
    }

    pub fn services(&self) -> Services {
        Services {
            permissions: self.permissions.clone(),
            capture: self.capture.clone(),
            action: self.action.clone(),
            feedback: self.feedback.clone(),
        }
    }
}
