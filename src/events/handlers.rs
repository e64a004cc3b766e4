use super::{AgentEventPayload, EventBus};
use crate::shutdown::ShutdownCoordinator;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handler that logs every agent event.
///
/// The headless runner uses this as its only subscriber; an embedding
/// shell would add its own subscription alongside it.
pub struct EventLogger {
    event_bus: EventBus,
    shutdown: ShutdownCoordinator,
}

impl EventLogger {
    pub fn new(event_bus: EventBus, shutdown: ShutdownCoordinator) -> Self {
        Self {
            event_bus,
            shutdown,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        // Subscribe before spawning so nothing published between this
        // call returning and the task's first poll is lost.
        let mut rx = self.event_bus.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => {
                        match result {
                            Ok(event) => match &event.payload {
                                AgentEventPayload::ItemProcessed { item } => {
                                    info!(
                                        id = %item.id,
                                        source = item.source.as_str(),
                                        status = ?item.status,
                                        "Item processed"
                                    );
                                }
                                AgentEventPayload::SetupRequested { reason } => {
                                    warn!(reason = %reason, "Setup requested");
                                }
                                AgentEventPayload::ServerStatus { running } => {
                                    info!(running, "Server status changed");
                                }
                            },
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Event logger stopped (event bus closed)");
                                break;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event logger lagged behind");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Event logger gracefully shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_logger_exits_on_shutdown() {
        let bus = EventBus::new(16);
        let shutdown = ShutdownCoordinator::new();
        let handle = EventLogger::new(bus.clone(), shutdown.clone()).start();

        bus.publish(AgentEventPayload::ServerStatus { running: true });
        shutdown.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("logger should exit after shutdown")
            .unwrap();
    }
}
