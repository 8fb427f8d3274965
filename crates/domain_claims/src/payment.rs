//! Claim payments and reconciliation status

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::temporal::ensure_not_future;
use core_kernel::{ClaimId, DateRange, PaymentId, UserId};

use crate::error::ClaimError;

/// Reconciliation status, derived from amounts on every read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "PAID")]
    Paid,
    #[serde(rename = "PARTIALLY_PAID")]
    PartiallyPaid,
    #[serde(rename = "UNPAID")]
    Unpaid,
}

impl PaymentStatus {
    /// Derives the status from the paid and expected amounts
    ///
    /// Equal amounts win over everything else, so `0 == 0` is `Paid`. Any
    /// other positive payment, overpayment included, is `PartiallyPaid`.
    pub fn derive(amount_paid: Decimal, amount_expected: Decimal) -> Self {
        if amount_paid == amount_expected {
            PaymentStatus::Paid
        } else if amount_paid > Decimal::ZERO {
            PaymentStatus::PartiallyPaid
        } else {
            PaymentStatus::Unpaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::PartiallyPaid => "PARTIALLY_PAID",
            PaymentStatus::Unpaid => "UNPAID",
        }
    }

    /// The amount comparison that selects exactly the rows deriving to this status
    pub fn predicate(self) -> AmountPredicate {
        match self {
            PaymentStatus::Paid => AmountPredicate::PaidEqualsExpected,
            PaymentStatus::PartiallyPaid => AmountPredicate::PartialPayment,
            PaymentStatus::Unpaid => AmountPredicate::NothingPaid,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status filter expressed over the stored amount columns
///
/// Status is never stored, so filters go through this translation. Each
/// variant holds for a row iff `PaymentStatus::derive` yields the matching
/// status for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountPredicate {
    PaidEqualsExpected,
    PartialPayment,
    NothingPaid,
}

impl AmountPredicate {
    pub fn matches(&self, amount_paid: Decimal, amount_expected: Decimal) -> bool {
        match self {
            AmountPredicate::PaidEqualsExpected => amount_paid == amount_expected,
            AmountPredicate::PartialPayment => {
                amount_paid > Decimal::ZERO && amount_paid != amount_expected
            }
            AmountPredicate::NothingPaid => {
                amount_paid <= Decimal::ZERO && amount_paid != amount_expected
            }
        }
    }

    /// SQL condition over the given paid and expected column expressions
    pub fn sql(&self, paid: &str, expected: &str) -> String {
        match self {
            AmountPredicate::PaidEqualsExpected => format!("{paid} = {expected}"),
            AmountPredicate::PartialPayment => format!("({paid} > 0 AND {paid} <> {expected})"),
            AmountPredicate::NothingPaid => format!("({paid} <= 0 AND {paid} <> {expected})"),
        }
    }
}

/// A reconciliation event against a claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPayment {
    pub id: PaymentId,
    pub claim_id: ClaimId,
    pub amount_expected: Decimal,
    pub amount_paid: Decimal,
    pub payment_date: NaiveDate,
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    pub flagged_by: Option<UserId>,
    /// Display name of the user who recorded it
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl ClaimPayment {
    /// Records a payment where the paid amount is what was expected
    pub fn record(request: &NewClaimPayment, created_by: impl Into<String>) -> Self {
        Self {
            id: PaymentId::new_v7(),
            claim_id: request.claim_id,
            amount_expected: request.amount,
            amount_paid: request.amount,
            payment_date: request.payment_date,
            is_flagged: false,
            flag_reason: None,
            flagged_by: None,
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }

    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::derive(self.amount_paid, self.amount_expected)
    }

    pub fn outstanding(&self) -> Decimal {
        self.amount_expected - self.amount_paid
    }

    /// Marks the payment for review by the user who raised the discrepancy;
    /// a matched payment has nothing to flag
    pub fn flag(&mut self, reason: impl Into<String>, flagged_by: UserId) -> Result<(), ClaimError> {
        if self.amount_paid == self.amount_expected {
            return Err(ClaimError::PaymentAlreadyMatched);
        }
        self.is_flagged = true;
        self.flag_reason = Some(reason.into());
        self.flagged_by = Some(flagged_by);
        Ok(())
    }

    /// Orders payments so the most recent one sorts last
    pub fn recency_key(&self) -> (DateTime<Utc>, PaymentId) {
        (self.created_at, self.id)
    }
}

/// Payment creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClaimPayment {
    pub claim_id: ClaimId,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
}

impl NewClaimPayment {
    pub fn validate(&self, today: NaiveDate) -> Result<(), ClaimError> {
        if self.amount <= Decimal::ZERO {
            return Err(ClaimError::InvalidAmount(format!(
                "amount must be greater than 0, got {}",
                self.amount
            )));
        }
        ensure_not_future(self.payment_date, today)
            .map_err(|_| ClaimError::FuturePaymentDate(self.payment_date.to_string()))
    }
}

/// Discrepancy flag payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagDiscrepancy {
    pub reason: String,
    pub reviewer_id: UserId,
}

/// Payment filter for listing, export and summaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub hmo_name: Option<String>,
    #[serde(default)]
    pub payment_dates: DateRange,
    pub status: Option<PaymentStatus>,
}

impl PaymentFilter {
    pub fn between(range: DateRange) -> Self {
        Self {
            payment_dates: range,
            ..Default::default()
        }
    }
}

/// Payment joined with the names needed for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub payment: ClaimPayment,
    pub hmo_name: String,
}

/// One row of a payment status listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusRow {
    pub claim_id: ClaimId,
    pub payment_id: PaymentId,
    pub amount_expected: Decimal,
    pub amount_paid: Decimal,
    pub payment_date: NaiveDate,
    pub hmo_name: String,
    pub status: PaymentStatus,
}

impl From<&PaymentRecord> for PaymentStatusRow {
    fn from(record: &PaymentRecord) -> Self {
        let payment = &record.payment;
        Self {
            claim_id: payment.claim_id,
            payment_id: payment.id,
            amount_expected: payment.amount_expected,
            amount_paid: payment.amount_paid,
            payment_date: payment.payment_date,
            hmo_name: record.hmo_name.clone(),
            status: payment.status(),
        }
    }
}

/// Per-HMO payment totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmoPaymentSummary {
    pub hmo_name: String,
    pub total_claims: u64,
    pub total_paid: Decimal,
    pub outstanding_balance: Decimal,
}

/// Aggregates payments per HMO name, keeping first-encountered order
pub fn summarize_by_hmo(records: &[PaymentRecord]) -> Vec<HmoPaymentSummary> {
    let mut summaries: Vec<HmoPaymentSummary> = Vec::new();

    for record in records {
        let index = match summaries.iter().position(|s| s.hmo_name == record.hmo_name) {
            Some(index) => index,
            None => {
                summaries.push(HmoPaymentSummary {
                    hmo_name: record.hmo_name.clone(),
                    total_claims: 0,
                    total_paid: Decimal::ZERO,
                    outstanding_balance: Decimal::ZERO,
                });
                summaries.len() - 1
            }
        };

        let summary = &mut summaries[index];
        summary.total_claims += 1;
        summary.total_paid += record.payment.amount_paid;
        summary.outstanding_balance += record.payment.outstanding();
    }

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment(expected: Decimal, paid: Decimal) -> ClaimPayment {
        let mut p = ClaimPayment::record(
            &NewClaimPayment {
                claim_id: ClaimId::new(),
                amount: expected,
                payment_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            },
            "Ada Obi",
        );
        p.amount_paid = paid;
        p
    }

    #[test]
    fn test_derivation_boundaries() {
        assert_eq!(PaymentStatus::derive(dec!(0), dec!(0)), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::derive(dec!(100), dec!(100)), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::derive(dec!(50), dec!(100)), PaymentStatus::PartiallyPaid);
        assert_eq!(PaymentStatus::derive(dec!(0), dec!(100)), PaymentStatus::Unpaid);
    }

    #[test]
    fn test_overpayment_is_partially_paid() {
        assert_eq!(PaymentStatus::derive(dec!(150), dec!(100)), PaymentStatus::PartiallyPaid);
    }

    #[test]
    fn test_recorded_payment_is_matched() {
        let p = payment(dec!(100), dec!(100));
        assert_eq!(p.status(), PaymentStatus::Paid);
        assert_eq!(p.created_by, "Ada Obi");
        assert!(!p.is_flagged);
    }

    #[test]
    fn test_flag_requires_mismatch() {
        let mut matched = payment(dec!(100), dec!(100));
        assert!(matches!(
            matched.flag("short", UserId::new()),
            Err(ClaimError::PaymentAlreadyMatched)
        ));
        assert!(!matched.is_flagged);

        let staff = UserId::new();
        let mut short = payment(dec!(100), dec!(40));
        short.flag("short by 60", staff).unwrap();
        assert!(short.is_flagged);
        assert_eq!(short.flagged_by, Some(staff));
        assert_eq!(short.flag_reason.as_deref(), Some("short by 60"));
    }

    #[test]
    fn test_validation() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut request = NewClaimPayment {
            claim_id: ClaimId::new(),
            amount: dec!(0),
            payment_date: today,
        };
        assert!(matches!(request.validate(today), Err(ClaimError::InvalidAmount(_))));

        request.amount = dec!(-5);
        assert!(matches!(request.validate(today), Err(ClaimError::InvalidAmount(_))));

        request.amount = dec!(10);
        assert!(request.validate(today).is_ok());

        request.payment_date = today.succ_opt().unwrap();
        assert!(matches!(request.validate(today), Err(ClaimError::FuturePaymentDate(_))));
    }

    #[test]
    fn test_predicate_sql() {
        assert_eq!(
            AmountPredicate::PaidEqualsExpected.sql("p.amount_paid", "p.amount_expected"),
            "p.amount_paid = p.amount_expected"
        );
        assert_eq!(
            PaymentStatus::Unpaid.predicate().sql("paid", "expected"),
            "(paid <= 0 AND paid <> expected)"
        );
    }

    #[test]
    fn test_summary_groups_by_hmo_in_encounter_order() {
        let records = vec![
            PaymentRecord { payment: payment(dec!(100), dec!(50)), hmo_name: "Hygeia".into() },
            PaymentRecord { payment: payment(dec!(30), dec!(30)), hmo_name: "Avon".into() },
            PaymentRecord { payment: payment(dec!(70), dec!(70)), hmo_name: "Hygeia".into() },
        ];

        let summary = summarize_by_hmo(&records);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].hmo_name, "Hygeia");
        assert_eq!(summary[0].total_claims, 2);
        assert_eq!(summary[0].total_paid, dec!(120));
        assert_eq!(summary[0].outstanding_balance, dec!(50));
        assert_eq!(summary[1].hmo_name, "Avon");
        assert_eq!(summary[1].outstanding_balance, dec!(0));
    }
}
