//! voice-workflow-daemon: runs one voice workflow controller as a daemon
//!
//! - Workflow controller wired to local collaborators
//! - IPC server exposing start/stop/reset and state notifications
//! - Watchdog stopping workflows that exceed their deadline

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voice_workflow::config::Config;
use voice_workflow::ipc::Server;
use voice_workflow::lifecycle::{watchdog, ShutdownSignal};
use voice_workflow::services::local;
use voice_workflow::WorkflowController;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "voice-workflow-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, feedback = config.feedback_enabled, "configuration loaded");

    let mut shutdown = ShutdownSignal::new()?;

    let controller = Arc::new(WorkflowController::new(
        local::services(&config),
        config.controller_options(),
    ));

    let watchdog = config.watchdog.map(|deadline| {
        info!(deadline_secs = deadline.as_secs(), "watchdog enabled");
        tokio::spawn(watchdog::run(Arc::clone(&controller), deadline))
    });

    let server = Server::new(&config.socket_path, Arc::clone(&controller))?;
    let mut events = controller.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log workflow events
        _ = async {
            loop {
                match events.recv().await {
                    Ok(event) => info!(%event, "workflow event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "workflow event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("workflow event logger exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    controller.shutdown().await;
    server.shutdown().await;

    info!("voice-workflow-daemon stopped");

    Ok(())
}
