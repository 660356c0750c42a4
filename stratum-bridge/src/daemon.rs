//! Daemon lifecycle: start the listener, wait for a signal, shut down.

use std::sync::Arc;

use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::BridgeConfig;
use crate::pool::PoolManager;
use crate::server::{self, Admission, AllowAll};
use crate::tracing::prelude::*;

/// Owns the pool connection and the WebSocket listener.
pub struct Daemon {
    config: BridgeConfig,
    admission: Arc<dyn Admission>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            admission: Arc::new(AllowAll),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Replace the default allow-all admission policy.
    pub fn with_admission(mut self, admission: Arc<dyn Admission>) -> Self {
        self.admission = admission;
        self
    }

    /// Run until SIGINT or SIGTERM. Fails if the listener fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        let pool = PoolManager::new(self.config.pool(), self.shutdown.clone());

        let mut listener = self.tracker.spawn(server::serve(
            self.config.server(),
            pool.clone(),
            self.admission.clone(),
            self.shutdown.clone(),
        ));
        self.tracker.close();

        info!(worker = %pool.config().worker, "Started.");

        // The listener only finishes first when it failed.
        let result = tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
                Ok(())
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                Ok(())
            }
            joined = &mut listener => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "Listener failed");
                    Err(e)
                }
                Err(e) => Err(e.into()),
            },
        };

        trace!("Shutting down.");
        self.shutdown.cancel();

        self.tracker.wait().await;
        pool.closed().await;
        info!("Exiting.");

        result
    }
}
