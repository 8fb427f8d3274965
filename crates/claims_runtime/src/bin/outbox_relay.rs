//! Outbox Relay Binary
//!
//! Delivers queued notification emails and retries failed ones until the
//! attempt cap is reached. Services already attempt delivery right after
//! each commit; this process picks up whatever they could not send.
//!
//! # Usage
//!
//! ```bash
//! CLAIMS_DATABASE_URL=postgres://... cargo run --bin outbox-relay
//! ```
//!
//! # Environment Variables
//!
//! * `CLAIMS_DATABASE_URL` - PostgreSQL connection string
//! * `CLAIMS_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//! * `CLAIMS_LOG_JSON` - Emit JSON log lines (default: false)
//! * `CLAIMS_OUTBOX_BATCH_SIZE` - Events per pass (default: 50)
//! * `CLAIMS_OUTBOX_POLL_INTERVAL_SECS` - Seconds between passes (default: 30)
//! * `CLAIMS_OUTBOX_MAX_ATTEMPTS` - Attempts before an event is abandoned (default: 5)
//! * `CLAIMS_MAIL_FROM` - Sender address

use std::sync::Arc;

use anyhow::Context;
use claims_runtime::{init_tracing, run_relay, ClaimsServices, RuntimeConfig, TracingMailer};
use core_kernel::HealthCheckable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::load().context("loading CLAIMS_* configuration")?;
    init_tracing(&config).context("installing tracing subscriber")?;

    tracing::info!(
        batch_size = config.outbox_batch_size,
        poll_interval_secs = config.outbox_poll_interval_secs,
        max_attempts = config.outbox_max_attempts,
        "Starting outbox relay"
    );

    let mailer = Arc::new(TracingMailer::new(config.mail_from.clone()));
    let services = ClaimsServices::connect(&config, mailer)
        .await
        .context("connecting to the claims database")?;

    let health = services.store.health_check().await;
    tracing::info!(status = ?health.status, latency_ms = health.latency_ms, "database health checked");

    run_relay(&services.relay, config.poll_interval(), shutdown_signal()).await;

    services.pool.close().await;
    tracing::info!("Outbox relay shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping relay");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping relay");
        }
    }
}
