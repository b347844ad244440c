//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::events::WorkflowEvent;
use crate::state::WorkflowState;

/// Largest frame body accepted from a client
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Failure to read a frame from a peer
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Length prefix over [`MAX_FRAME_LEN`]; the stream cannot be resynced
    #[error("frame of {0} bytes exceeds limit of {MAX_FRAME_LEN}")]
    TooLarge(usize),

    /// Frame was read whole but is not a valid message
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Requests from an observer to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Begin a workflow (no-op while one is running or a failure is pending)
    StartWorkflow,

    /// Abort the running workflow
    StopWorkflow,

    /// Acknowledge a finished or failed workflow
    Reset,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to workflow event notifications
    Subscribe,
}

/// Responses from daemon to observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Result of a start/stop/reset command
    Accepted {
        /// Whether the command changed anything
        accepted: bool,
        /// State right after the command was applied
        state: WorkflowState,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Push notification for subscribed clients
    Notification(Notification),

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to observer (for subscribed clients)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Workflow event occurred
    Event { event: WorkflowEvent },

    /// Notifications were dropped because the client fell behind
    Lagged { skipped: u64 },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current workflow state
    pub state: WorkflowState,

    /// Current workflow generation
    pub generation: u64,

    /// Whether results are spoken
    pub feedback_enabled: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

/// Read one length-prefixed JSON frame; `Ok(None)` on clean disconnect
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;

    Ok(Some(serde_json::from_slice(&msg_buf)?))
}

/// Write one length-prefixed JSON frame
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = u32::try_from(msg_bytes.len())
        .context("frame too large")?
        .to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}
