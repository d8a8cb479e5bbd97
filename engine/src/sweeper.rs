//! Periodic expiry of unanswered donor slots.
//!
//! Dashboard reads already sweep opportunistically; the sweeper makes sure a
//! request nobody looks at still gets its lapsed slots marked `Expired`.

use crate::app::BloodBridge;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Default sweep period
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that sweeps lapsed response windows on a timer
pub struct ExpirySweeper {
    app: Arc<BloodBridge>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ExpirySweeper {
    /// Create a sweeper.
    ///
    /// Returns the sweeper and a shutdown sender; send `true` to stop it.
    #[must_use]
    pub fn new(app: Arc<BloodBridge>, interval: Duration) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = Self {
            app,
            interval,
            shutdown: shutdown_rx,
        };
        (sweeper, shutdown_tx)
    }

    /// Sweep period
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep now. Returns the number of slots expired.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ServiceError`] if a table cannot be read or written.
    pub async fn sweep(&self) -> Result<usize> {
        self.app.sweep().await
    }

    /// Sweep every `interval` until shutdown is signalled.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(mut self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Starting expiry sweeper");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*self.shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(0) => tracing::trace!("Sweep found nothing to expire"),
                        Ok(expired) => tracing::info!(expired, "Expired unanswered donor slots"),
                        Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                    }
                }

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }
}
