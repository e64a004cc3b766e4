use tokio::sync::broadcast;

/// Coordinates graceful shutdown across the HTTP server, the watcher
/// forwarder, and event handlers.
///
/// Usage:
/// ```no_run
/// use snapflow::shutdown::ShutdownCoordinator;
/// use tokio::sync::mpsc;
///
/// # async fn example() {
/// let coordinator = ShutdownCoordinator::new();
///
/// // In long-running tasks:
/// let mut shutdown_rx = coordinator.subscribe();
/// let (tx, mut work_rx) = mpsc::channel::<String>(10);
/// loop {
///     tokio::select! {
///         item = work_rx.recv() => { /* handle item */ }
///         _ = shutdown_rx.recv() => {
///             break;
///         }
///     }
/// }
///
/// // To trigger shutdown:
/// coordinator.shutdown();
/// # }
/// ```
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(10);
        Self { shutdown_tx }
    }

    /// Subscribe to shutdown signals
    /// Returns a receiver that fires once shutdown is initiated
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger graceful shutdown
    /// All subscribers receive the signal
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Check if any subscribers are still listening
    pub fn has_subscribers(&self) -> bool {
        self.shutdown_tx.receiver_count() > 0
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ShutdownCoordinator {
    fn clone(&self) -> Self {
        Self {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}
