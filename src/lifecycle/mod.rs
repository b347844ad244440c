//! Process lifecycle: shutdown signals and the workflow watchdog

mod shutdown;
pub mod watchdog;

pub use shutdown::ShutdownSignal;
