//! Periodic outbox draining

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use domain_claims::{DeliveryReport, OutboxRelay};

/// Runs relay passes every `interval` until `shutdown` resolves
///
/// Each tick drains full batches until one comes back short, so a backlog
/// clears without waiting for further ticks. A failed pass is logged and
/// retried on the next tick. Returns the totals across all passes.
pub async fn run_relay<S>(relay: &OutboxRelay, interval: Duration, shutdown: S) -> DeliveryReport
where
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut totals = DeliveryReport::default();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let pass = drain(relay).await;
                totals.delivered += pass.delivered;
                totals.failed += pass.failed;
            }
        }
    }

    info!(delivered = totals.delivered, failed = totals.failed, "outbox relay stopped");
    totals
}

async fn drain(relay: &OutboxRelay) -> DeliveryReport {
    let mut totals = DeliveryReport::default();
    loop {
        match relay.deliver_pending().await {
            Ok(report) => {
                totals.delivered += report.delivered;
                totals.failed += report.failed;
                // failures stay pending, so only a clean full batch means more work
                if report.failed > 0 || report.delivered < relay.batch_size() as usize {
                    return totals;
                }
            }
            Err(e) => {
                error!(error = %e, "outbox relay pass failed");
                return totals;
            }
        }
    }
}
