//! Background Expiry Sweeper
//!
//! Lazy expiry only fires when a key is touched. A key that expires and is
//! never read again would otherwise sit in memory forever, so a background
//! task periodically walks every database (the admin one included) and runs
//! each key through [`Database::sweep`](super::Database::sweep).
//!
//! The sweeper shares the lookup path with client reads, so it can never
//! remove a key a client would still see, or leave one a client would not.

use crate::storage::registry::Databases;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between two sweeps (default: 100ms)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
        }
    }
}

/// Handle to the running sweeper. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    pub fn start(databases: Arc<Databases>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_ms = config.interval.as_millis() as u64,
            "Background expiry sweeper started"
        );
        tokio::spawn(sweeper_loop(databases, config, shutdown_rx));

        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        if !*self.shutdown_tx.borrow() {
            let _ = self.shutdown_tx.send(true);
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    databases: Arc<Databases>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    // The first tick of an interval fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let expired = sweep_all(&databases);
        if expired > 0 {
            debug!(expired, "Expired keys cleaned up");
        }
    }
}

/// One pass over every database. Returns the number of keys removed.
pub fn sweep_all(databases: &Databases) -> usize {
    databases
        .iter()
        .chain(std::iter::once(databases.admin()))
        .map(|db| db.sweep())
        .sum()
}
