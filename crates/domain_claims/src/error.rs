//! Claims domain errors

use core_kernel::PortError;
use serde::Serialize;
use thiserror::Error;

/// Coarse classification callers use to pick a response code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Forbidden,
    Conflict,
    Internal,
}

/// Errors that can occur in the claims domain
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Enrollee not found: {0}")]
    EnrolleeNotFound(String),

    #[error("HMO not found: {0}")]
    HmoNotFound(String),

    #[error("Authorization {code} not found for this HMO")]
    AuthorizationNotFound { code: String },

    #[error("Authorization {code} does not belong to enrollee {enrollee_no}")]
    AuthorizationEnrolleeMismatch { code: String, enrollee_no: String },

    #[error("No payment recorded for claim {0}")]
    PaymentNotFound(String),

    #[error("Reviewer not found: {0}")]
    ReviewerNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Payment date {0} cannot be in the future")]
    FuturePaymentDate(String),

    #[error("Payment amounts match; no discrepancy to flag")]
    PaymentAlreadyMatched,

    #[error("Could not allocate a unique claim reference")]
    ReferenceCollision,

    #[error("Failed to commit unit of work: {0}")]
    CommitFailed(#[source] PortError),

    #[error("Storage error: {0}")]
    Storage(#[from] PortError),
}

impl ClaimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaimError::ClaimNotFound(_)
            | ClaimError::EnrolleeNotFound(_)
            | ClaimError::HmoNotFound(_)
            | ClaimError::AuthorizationNotFound { .. }
            | ClaimError::AuthorizationEnrolleeMismatch { .. }
            | ClaimError::PaymentNotFound(_)
            | ClaimError::ReviewerNotFound(_)
            | ClaimError::UserNotFound(_)
            | ClaimError::NotificationNotFound(_) => ErrorKind::NotFound,
            ClaimError::InvalidAmount(_) | ClaimError::FuturePaymentDate(_) => {
                ErrorKind::InvalidInput
            }
            ClaimError::PaymentAlreadyMatched => ErrorKind::Forbidden,
            ClaimError::ReferenceCollision => ErrorKind::Conflict,
            ClaimError::CommitFailed(_) => ErrorKind::Internal,
            ClaimError::Storage(port) if port.is_conflict() => ErrorKind::Conflict,
            ClaimError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(ClaimError::ClaimNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            ClaimError::AuthorizationEnrolleeMismatch {
                code: "AUTH-1".into(),
                enrollee_no: "ENR-1".into(),
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(ClaimError::InvalidAmount("0".into()).kind(), ErrorKind::InvalidInput);
        assert_eq!(ClaimError::PaymentAlreadyMatched.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_storage_conflict_keeps_conflict_kind() {
        let err: ClaimError = PortError::conflict("duplicate claim_reference").into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: ClaimError = PortError::connection("refused").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
