//! Mail transport that writes outgoing email to the log
//!
//! Useful for local runs and for deployments where a sidecar tails the log.
//! A real transport implements the same `Mailer` port.

use async_trait::async_trait;
use tracing::info;

use core_kernel::{DomainPort, PortError};
use domain_claims::{EmailMessage, Mailer};

#[derive(Debug, Clone)]
pub struct TracingMailer {
    from: String,
}

impl TracingMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }

    pub fn from_address(&self) -> &str {
        &self.from
    }
}

impl DomainPort for TracingMailer {}

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), PortError> {
        if message.to.trim().is_empty() {
            return Err(PortError::validation("email recipient is empty"));
        }
        info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "email sent"
        );
        Ok(())
    }
}
