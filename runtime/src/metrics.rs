//! Prometheus metrics for observability and monitoring.
//!
//! This module owns the exporter and the metrics recorded by the runtime
//! itself:
//! - Table writes performed by a `Store`
//! - Time spent waiting for a table's write lock
//!
//! Domain metrics are described by the application and registered through
//! [`MetricsServer::with_descriptions`].
//!
//! # Example
//!
//! ```rust,no_run
//! use bloodbridge_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use bloodbridge_core::record_store::Table;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    descriptions: Vec<fn()>,
    started: bool,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            descriptions: Vec::new(),
            started: false,
        }
    }

    /// Register an additional set of metric descriptions, run on `start`.
    #[must_use]
    pub fn with_descriptions(mut self, describe: fn()) -> Self {
        self.descriptions.push(describe);
        self
    }

    /// Address the exporter listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether `start` installed the exporter.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Install the Prometheus recorder and start its HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed is reported as a warning, not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();
        for describe in &self.descriptions {
            describe();
        }

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            // Latency buckets, seconds
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install() {
            Ok(()) => {
                self.started = true;
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }
}

/// Register runtime metric descriptions.
fn register_metrics() {
    describe_counter!(
        "bloodbridge_store_writes_total",
        "Total number of whole-table saves, by table"
    );
    describe_histogram!(
        "bloodbridge_store_lock_wait_duration_seconds",
        "Time spent waiting for a table's write lock"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record a whole-table save.
    pub fn record_write(table: Table) {
        counter!("bloodbridge_store_writes_total", "table" => table.name()).increment(1);
    }

    /// Record how long a writer waited for the table lock.
    pub fn record_lock_wait(table: Table, waited: Duration) {
        histogram!("bloodbridge_store_lock_wait_duration_seconds", "table" => table.name())
            .record(waited.as_secs_f64());
    }
}
