use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

const STAGE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// A handle for managing graceful shutdown of the application
pub struct ShutdownManager {
    /// Receiver for shutdown signals
    pub rx: mpsc::Receiver<()>,
}

impl ShutdownManager {
    /// Create a new ShutdownManager and setup signal handlers
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);

        // Setup Ctrl+C handler
        let tx_clone = tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx_clone.send(()).await;
                }
                Err(err) => {
                    error!("Error listening for ctrl+c: {}", err);
                }
            }
        });

        // Setup SIGTERM handler on Unix platforms
        #[cfg(unix)]
        {
            let tx_clone = tx.clone();
            tokio::spawn(async move {
                let mut term_signal =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("Failed to install SIGTERM handler");

                term_signal.recv().await;
                let _ = tx_clone.send(()).await;
            });
        }

        ShutdownManager { rx }
    }

    /// Run `future` to completion, or return `None` if a shutdown signal
    /// arrives first
    pub async fn run_until_shutdown<F, T>(&mut self, future: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            _ = self.rx.recv() => {
                info!("shutdown requested");
                None
            }
            result = future => Some(result),
        }
    }

    /// Wait for a shutdown signal or for a stage of the pipeline to stop,
    /// then tear the pipeline down
    pub async fn run_pipeline(&mut self, daemon: gasket::daemon::Daemon) {
        let mut ticker = tokio::time::interval(STAGE_CHECK_INTERVAL);

        loop {
            tokio::select! {
                _ = self.rx.recv() => {
                    info!("shutdown requested, stopping pipeline...");
                    break;
                }
                _ = ticker.tick() => {
                    if daemon.should_stop() {
                        warn!("a pipeline stage stopped, shutting down...");
                        break;
                    }
                }
            }
        }

        // teardown joins the stage threads
        tokio::task::block_in_place(|| daemon.teardown());

        info!("pipeline stopped");
    }
}
