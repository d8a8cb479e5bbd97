//! BloodBridge daemon.
//!
//! Opens the JSON record store, exposes Prometheus metrics and runs the
//! expiry sweeper until interrupted.

use bloodbridge::config::Config;
use bloodbridge::metrics::register_business_metrics;
use bloodbridge::notify::{ConsoleNotifier, DonorNotifier, SmtpNotifier};
use bloodbridge::{BloodBridge, ExpirySweeper};
use bloodbridge_runtime::JsonFileStore;
use bloodbridge_runtime::metrics::MetricsServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bloodbridge=info,bloodbridge_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BloodBridge");

    let config = Config::from_env();
    info!(
        data_dir = %config.storage.data_dir.display(),
        radius_km = config.matching.radius_km,
        response_window_secs = config.matching.response_window_secs,
        smtp = config.smtp.is_some(),
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr =
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port).parse()?;
    let mut metrics_server = MetricsServer::new(metrics_addr).with_descriptions(register_business_metrics);
    if let Err(e) = metrics_server.start() {
        warn!(error = %e, "Metrics exporter unavailable, continuing without it");
    }

    let notifier: Arc<dyn DonorNotifier> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpNotifier::new(
            &smtp.host,
            smtp.port,
            smtp.username.clone(),
            smtp.password.clone(),
            &smtp.from_email,
            &smtp.from_name,
        )?),
        None => {
            info!("SMTP not configured, donor alerts go to the log");
            Arc::new(ConsoleNotifier)
        },
    };

    let records = Arc::new(JsonFileStore::new(config.storage.data_dir.clone()));
    let app = Arc::new(
        BloodBridge::builder(records)
            .policy(config.matching.policy())
            .base_url(config.matching.base_url.clone())
            .notifier(notifier)
            .build(),
    );

    let (sweeper, sweeper_shutdown) =
        ExpirySweeper::new(Arc::clone(&app), Duration::from_secs(config.matching.sweep_interval_secs));
    let sweeper_handle = tokio::spawn(sweeper.run());

    info!("BloodBridge ready");
    shutdown_signal().await;

    info!("Shutting down");
    if sweeper_shutdown.send(true).is_err() {
        warn!("Expiry sweeper already stopped");
    }

    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(timeout, sweeper_handle).await {
        Ok(Ok(())) => info!("Expiry sweeper stopped cleanly"),
        Ok(Err(e)) => error!(error = %e, "Expiry sweeper task failed"),
        Err(_) => warn!(timeout_secs = timeout.as_secs(), "Expiry sweeper did not stop in time"),
    }

    info!("BloodBridge stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
