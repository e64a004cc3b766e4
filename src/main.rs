//! Headless runner: loads config, brings up the agent session, and
//! keeps it alive until Ctrl+C.

use anyhow::Result;
use snapflow::events::{EventBus, EventLogger};
use snapflow::logging;
use snapflow::manager::ServerManager;
use snapflow::shutdown::ShutdownCoordinator;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;
    info!("Starting snapflow v{}", env!("CARGO_PKG_VERSION"));

    let events = EventBus::default();
    let shutdown = ShutdownCoordinator::new();
    let logger_handle = EventLogger::new(events.clone(), shutdown.clone()).start();

    let manager = ServerManager::new(events);
    let config = manager.load_config()?;
    let session = match manager.start(config).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to start: {}", e);
            shutdown.shutdown();
            let _ = logger_handle.await;
            return Err(e.into());
        }
    };
    info!("📍 Submission endpoint: {}", session.endpoint_url);
    info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Err(e) = manager.stop().await {
        error!("Error during shutdown: {}", e);
    }
    shutdown.shutdown();
    let _ = logger_handle.await;

    Ok(())
}
