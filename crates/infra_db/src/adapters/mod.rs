//! Domain Adapters
//!
//! PostgreSQL implementations of the claims domain ports. Each adapter
//! translates between row types in [`crate::repositories`] and domain models.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresClaimStore;
//! use domain_claims::ClaimStore;
//!
//! let store = PostgresClaimStore::new(pool);
//! let claim = store.find_claim(claim_id).await?;
//! ```

pub mod claim_store;
pub mod directory;

pub use claim_store::{PgUnitOfWork, PostgresClaimStore};
pub use directory::{PgEligibilityResolver, PgIdentityResolver};
