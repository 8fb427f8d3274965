//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the provider claims core, built on SQLx.
//!
//! # Architecture
//!
//! - [`repositories`]: SQL statements and row types, written against a
//!   borrowed `PgConnection` so they run on pooled connections and inside
//!   transactions alike
//! - [`adapters`]: implementations of the `domain_claims` ports
//! - [`pool`]: connection pool construction and embedded migrations
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig};
//! use infra_db::adapters::PostgresClaimStore;
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/provider_claims")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresClaimStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PgEligibilityResolver, PgIdentityResolver, PostgresClaimStore};
pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool, MIGRATOR};
