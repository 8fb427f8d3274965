//! Flat delimited exports of claim and payment listings

use std::borrow::Cow;

use chrono::SecondsFormat;

use crate::payment::PaymentStatusRow;
use crate::views::ClaimSummaryRow;

const DELIMITER: &str = ",";

pub const CLAIMS_HISTORY_COLUMNS: [&str; 6] =
    ["id", "enrolleeNo", "claimReference", "status", "hmoName", "createdAt"];

pub const PAYMENT_REPORT_COLUMNS: [&str; 6] =
    ["claimId", "hmoName", "amountExpected", "amountPaid", "status", "paymentDate"];

/// Renders the claims history table, header first
pub fn claims_history(rows: &[ClaimSummaryRow]) -> String {
    render(
        &CLAIMS_HISTORY_COLUMNS,
        rows.iter().map(|row| {
            vec![
                row.id.as_uuid().to_string(),
                row.enrollee_no.clone(),
                row.claim_reference.clone(),
                row.status.as_str().to_string(),
                row.hmo_name.clone(),
                row.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ]
        }),
    )
}

/// Renders the payment report table, header first
pub fn payment_report(rows: &[PaymentStatusRow]) -> String {
    render(
        &PAYMENT_REPORT_COLUMNS,
        rows.iter().map(|row| {
            vec![
                row.claim_id.as_uuid().to_string(),
                row.hmo_name.clone(),
                row.amount_expected.to_string(),
                row.amount_paid.to_string(),
                row.status.as_str().to_string(),
                row.payment_date.to_string(),
            ]
        }),
    )
}

fn render(columns: &[&str], rows: impl Iterator<Item = Vec<String>>) -> String {
    let mut lines = vec![join(columns.iter().copied())];
    lines.extend(rows.map(|fields| join(fields.iter().map(String::as_str))));
    lines.join("\n")
}

fn join<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    fields
        .map(escape)
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

// Quotes fields containing the delimiter, quotes or line breaks
fn escape(field: &str) -> Cow<'_, str> {
    if field.contains(DELIMITER) || field.contains(['"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use core_kernel::{ClaimId, PaymentId};
    use rust_decimal_macros::dec;

    use crate::claim::ClaimStatus;
    use crate::payment::PaymentStatus;

    #[test]
    fn test_claims_history_layout() {
        let id = ClaimId::new();
        let rows = vec![ClaimSummaryRow {
            id,
            enrollee_no: "ENR-001".into(),
            claim_reference: "CLAIM-1700000000000-42".into(),
            status: ClaimStatus::Pending,
            hmo_name: "Hygeia, Lagos".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        }];

        let text = claims_history(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,enrolleeNo,claimReference,status,hmoName,createdAt");
        assert_eq!(
            lines[1],
            format!(
                "{},ENR-001,CLAIM-1700000000000-42,Pending,\"Hygeia, Lagos\",2024-03-01T09:30:00.000Z",
                id.as_uuid()
            )
        );
    }

    #[test]
    fn test_payment_report_layout() {
        let claim_id = ClaimId::new();
        let rows = vec![PaymentStatusRow {
            claim_id,
            payment_id: PaymentId::new(),
            amount_expected: dec!(100.00),
            amount_paid: dec!(50.00),
            payment_date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            hmo_name: "Avon".into(),
            status: PaymentStatus::PartiallyPaid,
        }];

        let text = payment_report(&rows);
        assert_eq!(
            text,
            format!(
                "claimId,hmoName,amountExpected,amountPaid,status,paymentDate\n{},Avon,100.00,50.00,PARTIALLY_PAID,2024-04-02",
                claim_id.as_uuid()
            )
        );
    }

    #[test]
    fn test_empty_export_is_header_only() {
        assert_eq!(
            payment_report(&[]),
            "claimId,hmoName,amountExpected,amountPaid,status,paymentDate"
        );
    }

    #[test]
    fn test_quotes_are_doubled() {
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("plain"), "plain");
    }
}
