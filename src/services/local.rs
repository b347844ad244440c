//! Terminal-backed collaborators wired in by the daemon binary
//!
//! Speech is read as typed lines on standard input and spoken feedback is
//! written to the log. Real recognizers and synthesizers plug in through the
//! same traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    LanguageAction, PermissionGate, PermissionStatus, Services, SpeechCapture, SpeechFeedback,
    TranscriptEvent, TranscriptStream,
};
use crate::config::{Config, PermissionMode};
use crate::error::CaptureError;

const WORD_PACE: Duration = Duration::from_millis(120);

/// Build the daemon's collaborators from configuration
pub fn services(config: &Config) -> Services {
    Services {
        permissions: Arc::new(LocalPermissionGate::new(config.permissions)),
        capture: Arc::new(StdinCapture::new(tokio::io::stdin())),
        action: Arc::new(ReminderActionService),
        feedback: Arc::new(LogFeedback::new(WORD_PACE)),
    }
}

/// Permission gate driven by [`PermissionMode`]
pub struct LocalPermissionGate {
    mode: PermissionMode,
    granted: AtomicBool,
}

impl LocalPermissionGate {
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            mode,
            granted: AtomicBool::new(mode == PermissionMode::Granted),
        }
    }
}

#[async_trait]
impl PermissionGate for LocalPermissionGate {
    fn status(&self) -> PermissionStatus {
        let granted = self.granted.load(Ordering::SeqCst);
        PermissionStatus {
            microphone: granted,
            speech_recognition: granted,
            actions: granted,
        }
    }

    async fn request_all(&self) -> bool {
        let granted = self.mode != PermissionMode::Denied;
        self.granted.store(granted, Ordering::SeqCst);
        info!(granted, "permission request answered");
        granted
    }
}

type SharedLines<R> = Arc<tokio::sync::Mutex<Lines<BufReader<R>>>>;

/// Capture that treats each input line as one utterance.
///
/// Words are replayed as cumulative partial transcripts before the whole
/// line is delivered as the final transcript.
pub struct StdinCapture<R> {
    lines: SharedLines<R>,
    active: Mutex<Option<CancellationToken>>,
}

impl<R: AsyncRead + Unpin + Send + 'static> StdinCapture<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: Arc::new(tokio::sync::Mutex::new(BufReader::new(reader).lines())),
            active: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> SpeechCapture for StdinCapture<R> {
    async fn start(&self, cancel: CancellationToken) -> Result<TranscriptStream, CaptureError> {
        let session = cancel.child_token();
        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            // A start that lost the race with its own cancellation must not
            // displace the session of whoever started next
            if session.is_cancelled() {
                return Err(CaptureError::AudioSession("capture cancelled before start".into()));
            }
            if let Some(previous) = active.replace(session.clone()) {
                previous.cancel();
            }
        }

        let (tx, rx) = mpsc::channel(32);
        let lines = Arc::clone(&self.lines);

        tokio::spawn(async move {
            let mut lines = lines.lock().await;
            let line = tokio::select! {
                _ = session.cancelled() => return,
                line = lines.next_line() => line,
            };

            let events = match line {
                Ok(Some(line)) => utterance_events(&line),
                Ok(None) => vec![Err(CaptureError::Unavailable)],
                Err(e) => vec![Err(CaptureError::AudioSession(e.to_string()))],
            };

            for event in events {
                if session.is_cancelled() || tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        info!("listening on standard input");
        Ok(rx)
    }

    fn stop(&self) {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(session) = active {
            debug!("capture stopped");
            session.cancel();
        }
    }
}

/// Cumulative partials, one per word, followed by the final line
fn utterance_events(line: &str) -> Vec<Result<TranscriptEvent, CaptureError>> {
    let line = line.trim();
    let mut events = Vec::new();
    let mut partial = String::new();

    for word in line.split_whitespace() {
        if !partial.is_empty() {
            partial.push(' ');
        }
        partial.push_str(word);
        events.push(Ok(TranscriptEvent::Partial(partial.clone())));
    }

    events.push(Ok(TranscriptEvent::Final(line.to_owned())));
    events
}

/// Keyword interpreter that turns requests into reminders
pub struct ReminderActionService;

#[async_trait]
impl LanguageAction for ReminderActionService {
    async fn process(&self, text: &str, _cancel: CancellationToken) -> Result<String> {
        let text = text.trim();
        if !text.chars().any(char::is_alphanumeric) {
            bail!("could not understand {text:?}");
        }

        let task = strip_prefix_ignore_case(text, "remind me to ").unwrap_or(text);
        Ok(format!("Reminder created: {task}"))
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| text[prefix.len()..].trim_start())
}

/// Feedback that "speaks" into the log at a fixed pace per word
pub struct LogFeedback {
    pace: Duration,
}

impl LogFeedback {
    pub fn new(pace: Duration) -> Self {
        Self { pace }
    }
}

#[async_trait]
impl SpeechFeedback for LogFeedback {
    async fn speak(&self, text: &str, cancel: CancellationToken) -> Result<()> {
        info!(text, "speaking");

        let words = u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX);
        tokio::select! {
            _ = cancel.cancelled() => debug!("speech cancelled"),
            _ = tokio::time::sleep(self.pace.saturating_mul(words)) => {}
        }
        Ok(())
    }
}
