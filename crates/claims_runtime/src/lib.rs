//! Provider Claims Runtime
//!
//! Everything needed to run the claims core against PostgreSQL:
//!
//! - [`config`]: `RuntimeConfig` from `CLAIMS_*` environment variables
//! - [`telemetry`]: tracing subscriber installation
//! - [`wiring`]: the claims services built over one connection pool
//! - [`mailer`]: a log-backed `Mailer`
//! - [`relay`]: the periodic outbox loop behind the `outbox-relay` binary

pub mod config;
pub mod mailer;
pub mod relay;
pub mod telemetry;
pub mod wiring;

pub use config::RuntimeConfig;
pub use mailer::TracingMailer;
pub use relay::run_relay;
pub use telemetry::init_tracing;
pub use wiring::{relay_for, ClaimsServices};
