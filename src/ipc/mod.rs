//! IPC module for daemon-observer communication

mod protocol;
mod server;

pub use protocol::{
    read_frame, write_frame, DaemonStatus, FrameError, Notification, Request, Response,
};
pub use server::Server;
