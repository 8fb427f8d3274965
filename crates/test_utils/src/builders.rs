//! Test Data Builders
//!
//! Builders for claim submissions and payments. Tests set only the fields
//! they care about.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use core_kernel::{ClaimId, HmoId, PaymentId};
use domain_claims::{ClaimPayment, ServiceBreakdown, ServiceLine, SubmitClaim};

use crate::fixtures::ENROLLEE_NO;

/// Builder for claim submission payloads
pub struct SubmitClaimBuilder {
    enrollee_no: String,
    hmo_id: HmoId,
    lines: Vec<ServiceLine>,
    raw_breakdown: Option<Value>,
    diagnosis: Option<String>,
    note: Option<String>,
}

impl SubmitClaimBuilder {
    /// Defaults to the fixture enrollee with two service lines totalling 7500
    pub fn new(hmo_id: HmoId) -> Self {
        Self {
            enrollee_no: ENROLLEE_NO.to_string(),
            hmo_id,
            lines: vec![
                ServiceLine::new("Consultation", dec!(5000)),
                ServiceLine::new("Full blood count", dec!(2500)),
            ],
            raw_breakdown: None,
            diagnosis: Some("Malaria".to_string()),
            note: None,
        }
    }

    pub fn with_enrollee(mut self, enrollee_no: impl Into<String>) -> Self {
        self.enrollee_no = enrollee_no.into();
        self
    }

    pub fn with_lines(mut self, lines: Vec<ServiceLine>) -> Self {
        self.lines = lines;
        self
    }

    /// Replaces the breakdown with arbitrary JSON
    pub fn with_raw_breakdown(mut self, value: Value) -> Self {
        self.raw_breakdown = Some(value);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn build(self) -> SubmitClaim {
        let service_breakdown = match self.raw_breakdown {
            Some(value) => ServiceBreakdown::from_value(value),
            None => ServiceBreakdown::from_lines(&self.lines),
        };

        SubmitClaim {
            enrollee_no: self.enrollee_no,
            hmo_id: self.hmo_id,
            service_breakdown,
            documents: Value::Array(vec![Value::String("lab-report.pdf".to_string())]),
            diagnosis: self.diagnosis,
            test_results: Value::Null,
            discharge_summary: None,
            pre_auth_request_id: None,
            note: self.note,
        }
    }
}

/// Builder for payments stored directly, bypassing the engine
pub struct PaymentBuilder {
    claim_id: ClaimId,
    amount_expected: Decimal,
    amount_paid: Decimal,
    payment_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl PaymentBuilder {
    pub fn new(claim_id: ClaimId) -> Self {
        Self {
            claim_id,
            amount_expected: dec!(100),
            amount_paid: dec!(100),
            payment_date: days_ago(1),
            created_at: Utc::now(),
        }
    }

    pub fn amounts(mut self, expected: Decimal, paid: Decimal) -> Self {
        self.amount_expected = expected;
        self.amount_paid = paid;
        self
    }

    pub fn on(mut self, payment_date: NaiveDate) -> Self {
        self.payment_date = payment_date;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn build(self) -> ClaimPayment {
        ClaimPayment {
            id: PaymentId::new_v7(),
            claim_id: self.claim_id,
            amount_expected: self.amount_expected,
            amount_paid: self.amount_paid,
            payment_date: self.payment_date,
            is_flagged: false,
            flag_reason: None,
            flagged_by: None,
            created_by: "Ada Obi".to_string(),
            created_at: self.created_at,
        }
    }
}

/// Today's date minus `days`, in UTC
pub fn days_ago(days: u64) -> NaiveDate {
    Utc::now().date_naive() - Days::new(days)
}
