//! Claims Domain Ports
//!
//! Port interfaces the claims services depend on. The storage gateway is
//! split in two:
//!
//! - [`ClaimStore`]: non-transactional reads, the outbox, and `begin()`
//! - [`UnitOfWork`]: transactional reads and writes that commit or roll back
//!   together
//!
//! Enrollee eligibility, user identity and email delivery are external
//! collaborators behind [`EligibilityResolver`], [`IdentityResolver`] and
//! [`Mailer`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut uow = store.begin().await?;
//! uow.insert_claim(&claim).await?;
//! uow.insert_note(&note).await?;
//! uow.commit().await?;
//! ```
//!
//! A unit of work that is dropped without `commit` releases its resource
//! and discards its writes.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    ClaimId, DomainPort, HealthCheckable, HmoId, HospitalId, NotificationId, OutboxEventId,
    Pagination, PortError, UserId,
};

use crate::claim::{Claim, Note};
use crate::notification::{EmailMessage, Notification, OutboxEvent};
use crate::payment::{ClaimPayment, PaymentFilter, PaymentRecord};

/// Health maintenance organisation (payer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hmo {
    pub id: HmoId,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: HospitalId,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
}

/// Pre-authorization issued by an HMO for one enrollee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub code: String,
    pub hmo_id: HmoId,
    pub enrollee_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    ReviewAdmin,
    HospitalAdmin,
    HospitalStaff,
    HmoAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ReviewAdmin => "review_admin",
            Role::HospitalAdmin => "hospital_admin",
            Role::HospitalStaff => "hospital_staff",
            Role::HmoAdmin => "hmo_admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "review_admin" => Some(Role::ReviewAdmin),
            "hospital_admin" => Some(Role::HospitalAdmin),
            "hospital_staff" => Some(Role::HospitalStaff),
            "hmo_admin" => Some(Role::HmoAdmin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub hospital_id: Option<HospitalId>,
    /// Email of the user's hospital, when the user belongs to one
    pub hospital_email: Option<String>,
    pub role: Role,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolleeData {
    pub enrollee_no: String,
    pub first_name: String,
    pub last_name: String,
    pub hmo_id: Option<HmoId>,
}

impl EnrolleeData {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub found: bool,
    pub enrollee: Option<EnrolleeData>,
}

impl EligibilityResult {
    pub fn eligible(enrollee: EnrolleeData) -> Self {
        Self {
            found: true,
            enrollee: Some(enrollee),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            enrollee: None,
        }
    }
}

/// Optional claim filters supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimFilter {
    pub hmo_id: Option<HmoId>,
    pub enrollee_no: Option<String>,
    pub date: Option<NaiveDate>,
}

/// Claim listing filter; the hospital is always applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimQuery {
    pub hospital_id: HospitalId,
    pub hmo_id: Option<HmoId>,
    pub enrollee_no: Option<String>,
    /// Matches the calendar date of `created_at`
    pub date: Option<NaiveDate>,
}

impl ClaimQuery {
    pub fn for_hospital(hospital_id: HospitalId) -> Self {
        Self {
            hospital_id,
            hmo_id: None,
            enrollee_no: None,
            date: None,
        }
    }

    pub fn scoped(hospital_id: HospitalId, filter: &ClaimFilter) -> Self {
        Self {
            hospital_id,
            hmo_id: filter.hmo_id,
            enrollee_no: filter.enrollee_no.clone(),
            date: filter.date,
        }
    }

    pub fn matches(&self, claim: &Claim) -> bool {
        claim.hospital_id == self.hospital_id
            && self.hmo_id.map_or(true, |hmo| claim.hmo_id == hmo)
            && self
                .enrollee_no
                .as_deref()
                .map_or(true, |no| claim.enrollee_no == no)
            && self
                .date
                .map_or(true, |d| core_kernel::temporal::same_calendar_day(claim.created_at, d))
    }
}

/// Claim joined with its HMO's name
#[derive(Debug, Clone)]
pub struct ClaimListing {
    pub claim: Claim,
    pub hmo_name: String,
}

/// Payment listing query; scoped through the owning claim's hospital
#[derive(Debug, Clone)]
pub struct PaymentQuery {
    pub hospital_id: HospitalId,
    pub filter: PaymentFilter,
    /// `None` returns every matching row
    pub page: Option<Pagination>,
}

/// Storage gateway: reads outside a transaction, plus `begin`
///
/// Listing reads return rows ordered oldest first unless stated otherwise.
#[async_trait]
pub trait ClaimStore: DomainPort + HealthCheckable {
    /// Opens a unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError>;

    async fn find_claim(&self, id: ClaimId) -> Result<Option<Claim>, PortError>;

    async fn find_hmo(&self, id: HmoId) -> Result<Option<Hmo>, PortError>;

    async fn find_hospital(&self, id: HospitalId) -> Result<Option<Hospital>, PortError>;

    /// Claims matching the query, newest first
    async fn list_claims(&self, query: &ClaimQuery) -> Result<Vec<ClaimListing>, PortError>;

    /// Payments matching the query, ordered by payment date then creation
    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<PaymentRecord>, PortError>;

    /// A hospital's notifications, newest first, with the unpaged total
    async fn list_notifications(
        &self,
        hospital_id: HospitalId,
        page: Pagination,
    ) -> Result<(Vec<Notification>, u64), PortError>;

    async fn find_notification(&self, id: NotificationId) -> Result<Option<Notification>, PortError>;

    /// Leases up to `limit` deliverable events to the caller, oldest first
    ///
    /// An event is deliverable while it is undelivered, has fewer than
    /// `max_attempts` attempts and holds no unexpired lease. Claiming is
    /// atomic: concurrent callers never receive the same event while its
    /// lease runs. The lease ends early once the event is marked delivered or
    /// a failure is recorded against it.
    async fn claim_outbox_events(
        &self,
        limit: u32,
        max_attempts: u32,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>, PortError>;

    /// No-op when the event is already delivered
    async fn mark_outbox_delivered(
        &self,
        id: OutboxEventId,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), PortError>;

    /// Counts a failed attempt and releases the lease so the event can be retried
    async fn record_outbox_failure(&self, id: OutboxEventId, error: &str) -> Result<(), PortError>;
}

/// Transactional scope over the store
///
/// Writes become visible to other readers only after `commit`. Dropping an
/// unfinished unit of work discards its writes and releases its resource.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_claim(&mut self, id: ClaimId) -> Result<Option<Claim>, PortError>;

    async fn find_hmo(&mut self, id: HmoId) -> Result<Option<Hmo>, PortError>;

    async fn find_hospital(&mut self, id: HospitalId) -> Result<Option<Hospital>, PortError>;

    async fn find_authorization(
        &mut self,
        code: &str,
        hmo_id: HmoId,
    ) -> Result<Option<Authorization>, PortError>;

    async fn claim_reference_exists(&mut self, reference: &str) -> Result<bool, PortError>;

    /// Inserts the claim; a duplicate reference is a `PortError::Conflict`
    async fn insert_claim(&mut self, claim: &Claim) -> Result<(), PortError>;

    async fn update_claim(&mut self, claim: &Claim) -> Result<(), PortError>;

    async fn insert_note(&mut self, note: &Note) -> Result<(), PortError>;

    /// The most recent payment recorded for the claim
    async fn current_payment(&mut self, claim_id: ClaimId) -> Result<Option<ClaimPayment>, PortError>;

    async fn insert_payment(&mut self, payment: &ClaimPayment) -> Result<(), PortError>;

    async fn update_payment(&mut self, payment: &ClaimPayment) -> Result<(), PortError>;

    /// Persists the notification and returns the identifier it was stored under
    async fn insert_notification(
        &mut self,
        notification: &Notification,
    ) -> Result<NotificationId, PortError>;

    async fn insert_outbox_event(&mut self, event: &OutboxEvent) -> Result<(), PortError>;

    async fn commit(&mut self) -> Result<(), PortError>;

    async fn rollback(&mut self) -> Result<(), PortError>;
}

/// External enrollee eligibility check
#[async_trait]
pub trait EligibilityResolver: DomainPort {
    async fn check_eligibility(&self, enrollee_no: &str) -> Result<EligibilityResult, PortError>;
}

/// External user directory
#[async_trait]
pub trait IdentityResolver: DomainPort {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, PortError>;

    /// Returns the user only if they hold `role`
    async fn find_user_by_role(&self, id: UserId, role: Role) -> Result<Option<User>, PortError>;
}

/// Outbound email transport
#[async_trait]
pub trait Mailer: DomainPort {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), PortError>;
}
