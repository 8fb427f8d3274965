//! Core Kernel - Foundational types for the provider claims core
//!
//! This crate provides the building blocks shared by every other crate:
//! - Strongly typed identifiers
//! - The port error type and adapter marker traits
//! - Reporting date ranges and pagination

pub mod identifiers;
pub mod ports;
pub mod temporal;
pub mod pagination;

pub use identifiers::{
    ClaimId, NoteId, PaymentId, PreAuthRequestId, NotificationId, OutboxEventId,
    HmoId, HospitalId, UserId,
};
pub use ports::{PortError, DomainPort, AdapterHealth, HealthCheckable, HealthCheckResult};
pub use temporal::{DateRange, TemporalError};
pub use pagination::{Pagination, PageInfo};
