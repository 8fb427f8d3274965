//! Provider Claims Domain
//!
//! This crate implements the hospital side of the claims process: claim
//! submission and amendment, payment reconciliation, discrepancy flagging
//! and the notifications each of those produce.
//!
//! # Write path
//!
//! ```text
//! service op -> TransactionOrchestrator -> UnitOfWork (claim, note, payment,
//!               notification, outbox event) -> commit -> OutboxRelay -> Mailer
//! ```
//!
//! Payment status (`PAID`, `PARTIALLY_PAID`, `UNPAID`) is derived from amounts
//! on every read and never stored.

pub mod claim;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod notification;
pub mod outbox;
pub mod payment;
pub mod ports;
pub mod reconciliation;
pub mod response;
pub mod transaction;
pub mod views;

pub use claim::{
    Claim, ClaimQueryResponse, ClaimStatus, Note, ServiceBreakdown, ServiceLine, StatusChange,
    SubmitClaim, TimelineEntry,
};
pub use dispatch::NotificationDispatcher;
pub use error::{ClaimError, ErrorKind};
pub use lifecycle::ClaimLifecycleManager;
pub use notification::{
    EmailMessage, Notification, NotificationRecipient, NotificationStatus, NotificationTarget,
    OutboxEvent,
};
pub use outbox::{DeliveryReport, OutboxRelay};
pub use payment::{
    AmountPredicate, ClaimPayment, FlagDiscrepancy, HmoPaymentSummary, NewClaimPayment,
    PaymentFilter, PaymentRecord, PaymentStatus, PaymentStatusRow,
};
pub use ports::{
    Authorization, ClaimFilter, ClaimStore, EligibilityResolver, EligibilityResult, EnrolleeData,
    Hmo, Hospital, IdentityResolver, Mailer, Role, UnitOfWork, User,
};
pub use reconciliation::{AddInternalNote, PaymentReconciliationEngine};
pub use response::{Actor, ServiceResponse};
pub use transaction::TransactionOrchestrator;
