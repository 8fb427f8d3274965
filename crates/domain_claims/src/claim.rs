//! Provider claim aggregate

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use core_kernel::{ClaimId, HmoId, HospitalId, NoteId, PreAuthRequestId, UserId};

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// Submitted, awaiting the HMO's decision
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "Pending",
            ClaimStatus::Approved => "Approved",
            ClaimStatus::Rejected => "Rejected",
        }
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ClaimStatus::Pending),
            "Approved" => Ok(ClaimStatus::Approved),
            "Rejected" => Ok(ClaimStatus::Rejected),
            other => Err(format!("unknown claim status: {other}")),
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One billed service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub description: String,
    pub amount: Decimal,
}

impl ServiceLine {
    pub fn new(description: impl Into<String>, amount: Decimal) -> Self {
        Self {
            description: description.into(),
            amount,
        }
    }
}

/// Itemised services exactly as submitted
///
/// Kept as raw JSON so that a claim whose breakdown is not a list still
/// loads; such a claim totals to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceBreakdown(Value);

impl ServiceBreakdown {
    pub fn from_lines(lines: &[ServiceLine]) -> Self {
        let items = lines
            .iter()
            .map(|line| {
                let mut item = serde_json::Map::new();
                item.insert("description".into(), Value::String(line.description.clone()));
                item.insert("amount".into(), Value::String(line.amount.to_string()));
                Value::Object(item)
            })
            .collect();
        Self(Value::Array(items))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn is_list(&self) -> bool {
        self.0.is_array()
    }

    /// Lines with a readable amount; anything else is ignored
    pub fn lines(&self) -> Vec<ServiceLine> {
        let Some(items) = self.0.as_array() else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let amount = item.get("amount").and_then(parse_amount)?;
                let description = item
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(ServiceLine { description, amount })
            })
            .collect()
    }

    /// Sum of line amounts, zero when the breakdown is not a list
    pub fn total(&self) -> Decimal {
        self.lines().iter().map(|line| line.amount).sum()
    }
}

impl Default for ServiceBreakdown {
    fn default() -> Self {
        Self(Value::Array(Vec::new()))
    }
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// A recorded status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ClaimStatus,
    pub changed_at: DateTime<Utc>,
}

/// Free-text note attached to a claim. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub claim_id: ClaimId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn new(claim_id: ClaimId, author_id: UserId, body: impl Into<String>) -> Self {
        Self {
            id: NoteId::new_v7(),
            claim_id,
            author_id,
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

/// Entry in the derived claim timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: String,
    pub date: DateTime<Utc>,
}

/// Claim submission payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitClaim {
    pub enrollee_no: String,
    pub hmo_id: HmoId,
    #[serde(default)]
    pub service_breakdown: ServiceBreakdown,
    #[serde(default)]
    pub documents: Value,
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub test_results: Value,
    pub discharge_summary: Option<String>,
    pub pre_auth_request_id: Option<PreAuthRequestId>,
    pub note: Option<String>,
}

/// Fields a hospital may resend after the HMO queries a claim
///
/// Hospital, HMO and enrollee are fixed at submission and cannot be
/// supplied here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimQueryResponse {
    pub service_breakdown: Option<ServiceBreakdown>,
    pub documents: Option<Value>,
    pub diagnosis: Option<String>,
    pub test_results: Option<Value>,
    pub discharge_summary: Option<String>,
    pub note: Option<String>,
}

/// A provider's claim against an HMO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub enrollee_no: String,
    /// Human-facing reference, `CLAIM-<millis>-<n>`
    pub claim_reference: String,
    pub service_breakdown: ServiceBreakdown,
    pub documents: Value,
    pub diagnosis: Option<String>,
    pub test_results: Value,
    pub discharge_summary: Option<String>,
    pub status: ClaimStatus,
    pub status_history: Vec<StatusChange>,
    pub authorization_code: Option<String>,
    pub hospital_id: HospitalId,
    pub hmo_id: HmoId,
    pub pre_auth_request_id: Option<PreAuthRequestId>,
    /// Ordered by creation time
    pub notes: Vec<Note>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Creates a pending claim bound to the submitting hospital
    pub fn submit(payload: &SubmitClaim, hospital_id: HospitalId, claim_reference: String) -> Self {
        let now = Utc::now();

        Self {
            id: ClaimId::new_v7(),
            enrollee_no: payload.enrollee_no.clone(),
            claim_reference,
            service_breakdown: payload.service_breakdown.clone(),
            documents: payload.documents.clone(),
            diagnosis: payload.diagnosis.clone(),
            test_results: payload.test_results.clone(),
            discharge_summary: payload.discharge_summary.clone(),
            status: ClaimStatus::Pending,
            status_history: Vec::new(),
            authorization_code: None,
            hospital_id,
            hmo_id: payload.hmo_id,
            pre_auth_request_id: payload.pre_auth_request_id,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, hospital_id: HospitalId) -> bool {
        self.hospital_id == hospital_id
    }

    /// Overwrites the supplied fields; absent fields are left untouched
    pub fn apply_query_response(&mut self, response: &ClaimQueryResponse) {
        if let Some(breakdown) = &response.service_breakdown {
            self.service_breakdown = breakdown.clone();
        }
        if let Some(documents) = &response.documents {
            self.documents = documents.clone();
        }
        if let Some(diagnosis) = &response.diagnosis {
            self.diagnosis = Some(diagnosis.clone());
        }
        if let Some(test_results) = &response.test_results {
            self.test_results = test_results.clone();
        }
        if let Some(summary) = &response.discharge_summary {
            self.discharge_summary = Some(summary.clone());
        }
        self.updated_at = Utc::now();
    }

    pub fn link_authorization(&mut self, code: impl Into<String>) {
        self.authorization_code = Some(code.into());
        self.updated_at = Utc::now();
    }

    pub fn append_note(&mut self, note: Note) {
        self.notes.push(note);
    }

    /// Records a decision made by a downstream workflow
    pub fn record_status(&mut self, status: ClaimStatus, changed_at: DateTime<Utc>) {
        self.status = status;
        self.status_history.push(StatusChange { status, changed_at });
        self.updated_at = changed_at;
    }

    pub fn total_amount(&self) -> Decimal {
        self.service_breakdown.total()
    }

    /// `Submitted` at creation followed by every recorded transition
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        std::iter::once(TimelineEntry {
            status: "Submitted".to_string(),
            date: self.created_at,
        })
        .chain(self.status_history.iter().map(|change| TimelineEntry {
            status: change.status.as_str().to_string(),
            date: change.changed_at,
        }))
        .collect()
    }
}

/// Generates a claim reference of the form `CLAIM-<unix millis>-<0..=999>`
///
/// Not unique on its own; callers check the store before inserting.
pub fn generate_claim_reference(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..=999);
    format!("CLAIM-{}-{}", now.timestamp_millis(), suffix)
}
