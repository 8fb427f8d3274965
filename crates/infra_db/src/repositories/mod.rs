//! SQL for the provider claims tables
//!
//! Each module maps one group of tables to row types and plain async
//! functions over a `PgConnection`. Mapping rows to domain types is the
//! adapters' job.

pub mod claims;
pub mod directory;
pub mod notifications;
