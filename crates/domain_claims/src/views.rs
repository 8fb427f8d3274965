//! Read models returned by claim queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use core_kernel::{ClaimId, HmoId, PageInfo};

use crate::claim::{ClaimStatus, Note, ServiceBreakdown, TimelineEntry};
use crate::notification::Notification;
use crate::ports::ClaimListing;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSummaryRow {
    pub id: ClaimId,
    pub enrollee_no: String,
    pub claim_reference: String,
    pub status: ClaimStatus,
    pub hmo_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ClaimListing> for ClaimSummaryRow {
    fn from(listing: &ClaimListing) -> Self {
        let claim = &listing.claim;
        Self {
            id: claim.id,
            enrollee_no: claim.enrollee_no.clone(),
            claim_reference: claim.claim_reference.clone(),
            status: claim.status,
            hmo_name: listing.hmo_name.clone(),
            created_at: claim.created_at,
        }
    }
}

/// Summary row plus the itemised services and their total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimHistoryRow {
    #[serde(flatten)]
    pub summary: ClaimSummaryRow,
    pub service_breakdown: ServiceBreakdown,
    pub amount: Decimal,
}

impl From<&ClaimListing> for ClaimHistoryRow {
    fn from(listing: &ClaimListing) -> Self {
        Self {
            summary: ClaimSummaryRow::from(listing),
            service_breakdown: listing.claim.service_breakdown.clone(),
            amount: listing.claim.total_amount(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmoContact {
    pub id: HmoId,
    pub name: String,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDetails {
    pub id: ClaimId,
    pub enrollee_no: String,
    pub enrollee_name: String,
    pub hospital_name: String,
    pub claim_reference: String,
    pub status: ClaimStatus,
    pub authorization_code: Option<String>,
    pub documents: Value,
    pub diagnosis: Option<String>,
    pub test_results: Value,
    pub discharge_summary: Option<String>,
    pub service_breakdown: ServiceBreakdown,
    pub amount: Decimal,
    pub hmo: HmoContact,
    pub notes: Vec<Note>,
    pub timeline: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceAdvice {
    pub claim_reference: String,
    pub enrollee_no: String,
    pub hmo_name: String,
    pub hospital_name: String,
    pub status: ClaimStatus,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    #[serde(flatten)]
    pub page: PageInfo,
}
