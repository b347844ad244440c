//! Unix domain socket server for IPC
//!
//! Provides request-response access to the workflow controller and pushes
//! workflow events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::controller::WorkflowController;
use crate::events::WorkflowEvent;

use super::protocol::{
    read_frame, write_frame, DaemonStatus, FrameError, Notification, Request, Response,
};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    controller: Arc<WorkflowController>,
    start_time: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket and create a server for `controller`
    pub fn new(socket_path: &Path, controller: Arc<WorkflowController>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            controller,
            start_time: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let client = Client {
                        controller: Arc::clone(&self.controller),
                        start_time: self.start_time,
                    };
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = client.serve(stream) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Per-connection handler
struct Client {
    controller: Arc<WorkflowController>,
    start_time: Instant,
}

impl Client {
    /// Handle a single client connection
    async fn serve(self, stream: UnixStream) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Frames are read on their own task: `read_exact` is not cancel-safe
        let (request_tx, mut request_rx) = mpsc::channel::<Result<Request, FrameError>>(8);
        let read_task = tokio::spawn(async move {
            loop {
                let request = match read_frame::<_, Request>(&mut reader).await {
                    Ok(Some(request)) => Ok(request),
                    Ok(None) => {
                        debug!("client disconnected");
                        return Ok(());
                    }
                    // The whole frame was consumed, so the stream is still in sync
                    Err(e @ FrameError::Malformed(_)) => Err(e),
                    Err(e) => return Err(anyhow::Error::from(e)),
                };

                if request_tx.send(request).await.is_err() {
                    return Ok(());
                }
            }
        });

        let mut events: Option<broadcast::Receiver<WorkflowEvent>> = None;

        let result = loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let response = match request {
                        None => break Ok(()),
                        Some(Ok(request)) => {
                            debug!(?request, "received request");

                            if request == Request::Subscribe && events.is_none() {
                                events = Some(self.controller.subscribe());
                                debug!("client subscribed to notifications");
                            }

                            self.process_request(request)
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "rejecting malformed request");
                            Response::Error {
                                code: "bad_request".into(),
                                message: e.to_string(),
                            }
                        }
                    };
                    if let Err(e) = write_frame(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events) => {
                    if let Some(notification) = event {
                        if let Err(e) = push(&mut writer, notification).await {
                            break Err(e);
                        }
                    }
                }
            }
        };

        read_task.abort();
        if let Ok(Err(e)) = read_task.await {
            return Err(e);
        }
        result
    }

    /// Process a request and return a response
    fn process_request(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                state: self.controller.state(),
                generation: self.controller.generation(),
                feedback_enabled: self.controller.options().feedback_enabled,
                uptime_secs: self.start_time.elapsed().as_secs(),
            }),

            Request::StartWorkflow => {
                let accepted = self.controller.start_workflow();
                info!(accepted, "workflow start via IPC");
                self.accepted(accepted)
            }

            Request::StopWorkflow => {
                let accepted = self.controller.stop_workflow();
                info!(accepted, "workflow stop via IPC");
                self.accepted(accepted)
            }

            Request::Reset => {
                let accepted = self.controller.reset();
                info!(accepted, "workflow reset via IPC");
                self.accepted(accepted)
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    fn accepted(&self, accepted: bool) -> Response {
        Response::Accepted {
            accepted,
            state: self.controller.state(),
        }
    }
}

/// Next notification for a subscribed client; pends forever otherwise
async fn next_event(
    events: &mut Option<broadcast::Receiver<WorkflowEvent>>,
) -> Option<Notification> {
    let Some(rx) = events.as_mut() else {
        return std::future::pending().await;
    };

    match rx.recv().await {
        Ok(event) => Some(Notification::Event { event }),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "event subscriber lagged");
            Some(Notification::Lagged { skipped })
        }
        Err(broadcast::error::RecvError::Closed) => {
            *events = None;
            None
        }
    }
}

async fn push(writer: &mut OwnedWriteHalf, notification: Notification) -> Result<()> {
    write_frame(writer, &Response::Notification(notification)).await
}
