//! The sequence one workflow run walks through
//!
//! Collaborator calls are awaited one after another on a single task. Each
//! suspension point races the run's cancellation token; every result is
//! applied through a generation-checked transition, so a stopped or
//! superseded run can never write into a newer one.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Shared;
use crate::error::{CaptureError, ErrorKind};
use crate::events::WorkflowEvent;
use crate::services::TranscriptEvent;
use crate::state::WorkflowState;

/// Outcome of one stage of the run
enum Step<T> {
    Continue(T),
    /// Run is over (cancelled, superseded, or settled in a terminal state)
    Halt,
}

pub(super) async fn run(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    info!(generation, "workflow started");

    if let Step::Halt = acquire_permission(&shared, generation, &cancel).await {
        return;
    }

    let text = match listen(&shared, generation, &cancel).await {
        Step::Continue(text) => text,
        Step::Halt => return,
    };

    let result = match interpret(&shared, generation, &cancel, text).await {
        Step::Continue(result) => result,
        Step::Halt => return,
    };

    if shared.options.feedback_enabled {
        if let Step::Halt = respond(&shared, generation, &cancel, &result).await {
            return;
        }
    }

    if !shared.transition(generation, WorkflowState::Completed(result)) {
        return;
    }

    if let Some(hold) = shared.options.completed_hold {
        let expired = until_cancelled(&cancel, tokio::time::sleep(hold)).await;
        if expired.is_some() && shared.revert_completed(generation) {
            debug!(generation, "completed state expired");
        }
    }
}

/// Await `fut` unless the run is cancelled first
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

fn fail<T>(shared: &Shared, generation: u64, reason: ErrorKind) -> Step<T> {
    warn!(generation, stage = ?reason.stage(), %reason, "workflow failed");
    shared.transition(generation, WorkflowState::Failed(reason));
    Step::Halt
}

async fn acquire_permission(
    shared: &Shared,
    generation: u64,
    cancel: &CancellationToken,
) -> Step<()> {
    let permissions = &shared.services.permissions;

    if !permissions.currently_granted() {
        debug!(status = ?permissions.status(), "permissions missing, requesting");
        shared.emit(generation, WorkflowEvent::PermissionRequested);

        match until_cancelled(cancel, permissions.request_all()).await {
            None => return Step::Halt,
            Some(false) => return fail(shared, generation, ErrorKind::PermissionDenied),
            Some(true) => info!(generation, "permissions granted"),
        }
    }

    if shared.transition(generation, WorkflowState::Listening(String::new())) {
        Step::Continue(())
    } else {
        Step::Halt
    }
}

async fn listen(shared: &Shared, generation: u64, cancel: &CancellationToken) -> Step<String> {
    let capture = &shared.services.capture;

    // A cancelled run was already stopped under the slot lock; a second stop
    // from here could land on a newer run's session
    let mut stream = match until_cancelled(cancel, capture.start(cancel.clone())).await {
        None => return Step::Halt,
        Some(Err(e)) => {
            shared.stop_capture(generation);
            return fail(shared, generation, e.into());
        }
        Some(Ok(stream)) => stream,
    };

    let outcome = loop {
        let Some(item) = until_cancelled(cancel, stream.recv()).await else {
            return Step::Halt;
        };

        match item {
            Some(Ok(TranscriptEvent::Partial(text))) => {
                if !shared.update_partial(generation, text) {
                    return Step::Halt;
                }
            }
            Some(Ok(TranscriptEvent::Final(text))) => break Ok(text),
            Some(Err(e)) => break Err(ErrorKind::from(e)),
            None => {
                let e = CaptureError::Transcription(
                    "transcript stream ended before a final result".into(),
                );
                break Err(ErrorKind::from(e));
            }
        }
    };

    if !shared.stop_capture(generation) {
        return Step::Halt;
    }

    match outcome {
        Ok(text) if text.trim().is_empty() => fail(shared, generation, ErrorKind::EmptyTranscript),
        Ok(text) => {
            if shared.transition(generation, WorkflowState::Interpreting(text.clone())) {
                Step::Continue(text)
            } else {
                Step::Halt
            }
        }
        Err(reason) => fail(shared, generation, reason),
    }
}

async fn interpret(
    shared: &Shared,
    generation: u64,
    cancel: &CancellationToken,
    text: String,
) -> Step<String> {
    let action = &shared.services.action;

    match until_cancelled(cancel, action.process(&text, cancel.clone())).await {
        None => {
            debug!(generation, "interpretation cancelled");
            Step::Halt
        }
        Some(Err(e)) => fail(shared, generation, ErrorKind::interpretation(&e)),
        Some(Ok(result)) => Step::Continue(result),
    }
}

async fn respond(
    shared: &Shared,
    generation: u64,
    cancel: &CancellationToken,
    result: &str,
) -> Step<()> {
    if !shared.transition(generation, WorkflowState::Responding(result.to_owned())) {
        return Step::Halt;
    }

    let feedback = &shared.services.feedback;
    match until_cancelled(cancel, feedback.speak(result, cancel.clone())).await {
        None => Step::Halt,
        Some(Ok(())) => Step::Continue(()),
        Some(Err(e)) => {
            // Feedback failure never voids the action's result
            let message = format!("{e:#}");
            warn!(generation, error = %message, "spoken feedback failed");
            shared.emit(generation, WorkflowEvent::FeedbackFailed { message });
            Step::Continue(())
        }
    }
}
