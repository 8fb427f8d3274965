//! Outbox relay: delivers committed email events through the mailer

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ClaimError;
use crate::ports::{ClaimStore, Mailer};

pub const DEFAULT_BATCH_SIZE: u32 = 50;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 300;

/// Outcome of one relay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn is_empty(&self) -> bool {
        self.delivered == 0 && self.failed == 0
    }
}

#[derive(Clone)]
pub struct OutboxRelay {
    store: Arc<dyn ClaimStore>,
    mailer: Arc<dyn Mailer>,
    batch_size: u32,
    max_attempts: u32,
    lease: Duration,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn ClaimStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            mailer,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lease: Duration::seconds(DEFAULT_CLAIM_LEASE_SECS),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// How long a claimed event stays hidden from other relays; should
    /// outlast a mailer send
    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.lease = lease.max(Duration::seconds(1));
        self
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Claims one batch of undelivered events and sends them
    ///
    /// Events are leased before sending, so relays running side by side (a
    /// post-commit hook next to the polling loop, or several processes)
    /// never send the same event twice. A mailer failure is recorded against
    /// the event and counted; it does not stop the batch.
    #[instrument(skip(self))]
    pub async fn deliver_pending(&self) -> Result<DeliveryReport, ClaimError> {
        let events = self
            .store
            .claim_outbox_events(self.batch_size, self.max_attempts, self.lease)
            .await?;

        let mut report = DeliveryReport::default();
        for event in events {
            match self.mailer.send_email(&event.message()).await {
                Ok(()) => {
                    self.store.mark_outbox_delivered(event.id, Utc::now()).await?;
                    debug!(outbox_event_id = %event.id, to = %event.recipient, "email delivered");
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(outbox_event_id = %event.id, attempt = event.attempts + 1, error = %e, "email delivery failed");
                    self.store.record_outbox_failure(event.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        if !report.is_empty() {
            info!(delivered = report.delivered, failed = report.failed, "outbox pass complete");
        }
        Ok(report)
    }

    /// Post-commit hook for services; failures are logged and left for the
    /// relay loop to retry
    pub async fn deliver_after_commit(&self) {
        if let Err(e) = self.deliver_pending().await {
            error!(error = %e, "post-commit outbox delivery failed");
        }
    }
}
