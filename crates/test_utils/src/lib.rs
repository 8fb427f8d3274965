//! Test Utilities Crate
//!
//! Shared fixtures and helpers for the provider claims test suites.
//!
//! # Modules
//!
//! - `memory`: Transactional in-memory store plus resolver and mailer doubles
//! - `fixtures`: Seeded parties and the in-memory [`ClaimsHarness`]
//! - `builders`: Builders for claim submissions and payments
//! - `database`: Disposable PostgreSQL container with migrations applied
//! - `assertions`: Assertion helpers for error kinds and unit-of-work counters
//! - `generators`: Proptest strategies and faker-backed data

pub mod memory;
pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use memory::*;
pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
