//! Runtime configuration

use std::collections::HashMap;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use domain_claims::outbox::{DEFAULT_BATCH_SIZE, DEFAULT_CLAIM_LEASE_SECS, DEFAULT_MAX_ATTEMPTS};
use infra_db::DatabaseConfig;

pub const ENV_PREFIX: &str = "CLAIMS";

/// Settings for the claims services and the outbox relay
///
/// Every field can be set through a `CLAIMS_`-prefixed environment variable,
/// e.g. `CLAIMS_DATABASE_URL` or `CLAIMS_OUTBOX_POLL_INTERVAL_SECS`.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub log_json: bool,
    pub outbox_batch_size: u32,
    pub outbox_poll_interval_secs: u64,
    pub outbox_max_attempts: u32,
    /// How long a relay holds claimed events before another may retry them
    pub outbox_claim_lease_secs: u64,
    /// Sender address stamped on outgoing email
    pub mail_from: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/provider_claims".to_string(),
            max_connections: 10,
            min_connections: 1,
            log_level: "info".to_string(),
            log_json: false,
            outbox_batch_size: DEFAULT_BATCH_SIZE,
            outbox_poll_interval_secs: 30,
            outbox_max_attempts: DEFAULT_MAX_ATTEMPTS,
            outbox_claim_lease_secs: DEFAULT_CLAIM_LEASE_SECS as u64,
            mail_from: "claims@provider-claims.local".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Loads `.env` if present, then `CLAIMS_*` variables over the defaults
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_environment(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Loads from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_environment(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars)),
        )
    }

    fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Config::builder()
            .set_default("database_url", defaults.database_url)?
            .set_default("max_connections", i64::from(defaults.max_connections))?
            .set_default("min_connections", i64::from(defaults.min_connections))?
            .set_default("log_level", defaults.log_level)?
            .set_default("log_json", defaults.log_json)?
            .set_default("outbox_batch_size", i64::from(defaults.outbox_batch_size))?
            .set_default("outbox_poll_interval_secs", defaults.outbox_poll_interval_secs as i64)?
            .set_default("outbox_max_attempts", i64::from(defaults.outbox_max_attempts))?
            .set_default("outbox_claim_lease_secs", defaults.outbox_claim_lease_secs as i64)?
            .set_default("mail_from", defaults.mail_from)?
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.outbox_poll_interval_secs.max(1))
    }

    /// Clamped to one second through one day
    pub fn claim_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.outbox_claim_lease_secs.clamp(1, 86_400) as i64)
    }
}
