//! End-to-end claim workflows across the claims services
//!
//! Submission, authorization, payment, reporting and a delayed email
//! delivered by the relay loop, all against one in-memory world.

use std::time::Duration;

use chrono::Days;
use rust_decimal_macros::dec;

use claims_runtime::run_relay;
use core_kernel::{DateRange, Pagination};
use domain_claims::{AddInternalNote, ClaimFilter, NewClaimPayment, PaymentStatus};
use test_utils::{ClaimsHarness, SubmitClaimBuilder, AUTHORIZATION_CODE};

async fn undelivered(h: &ClaimsHarness) -> usize {
    h.store.outbox_events().await.iter().filter(|e| !e.is_delivered()).count()
}

#[tokio::test]
async fn test_claim_from_submission_to_payment_summary() {
    let h = ClaimsHarness::new().await;
    let today = chrono::Utc::now().date_naive();

    let claim = h
        .lifecycle
        .submit_claim(SubmitClaimBuilder::new(h.hmo.id).build(), &h.actor)
        .await
        .unwrap()
        .data;
    h.lifecycle
        .link_claim_to_authorization(claim.id, AUTHORIZATION_CODE.to_string(), &h.actor)
        .await
        .unwrap();

    let payment = h
        .reconciliation
        .create_claim_payment(
            NewClaimPayment {
                claim_id: claim.id,
                amount: dec!(7500),
                payment_date: today,
            },
            &h.actor,
        )
        .await
        .unwrap()
        .data;
    assert_eq!(payment.status(), PaymentStatus::Paid);

    let history = h
        .lifecycle
        .get_claims_history(&h.actor, ClaimFilter::default())
        .await
        .unwrap()
        .data;
    assert_eq!(history.len(), 1);

    let rows = h
        .reconciliation
        .get_claims_payment_status_for_hospital(&h.actor, Pagination::default())
        .await
        .unwrap()
        .data;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PaymentStatus::Paid);

    let range = DateRange::between(today - Days::new(1), today).unwrap();
    let summary = h
        .reconciliation
        .generate_hmo_payment_summary(&h.actor, range)
        .await
        .unwrap()
        .data;
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].hmo_name, "Hygeia HMO");
    assert_eq!(summary[0].total_paid, dec!(7500));
    assert_eq!(summary[0].outstanding_balance, dec!(0));
}

#[tokio::test]
async fn test_email_missed_after_commit_is_sent_by_relay() {
    let h = ClaimsHarness::new().await;
    let claim = h
        .lifecycle
        .submit_claim(SubmitClaimBuilder::new(h.hmo.id).build(), &h.actor)
        .await
        .unwrap()
        .data;
    let sent_before = h.mailer.sent().await.len();

    h.mailer.set_failing(true);
    h.reconciliation
        .add_internal_note(
            AddInternalNote {
                claim_id: claim.id,
                note: "Patient transferred to ICU".to_string(),
            },
            &h.actor,
        )
        .await
        .unwrap();
    assert_eq!(undelivered(&h).await, 1);

    h.mailer.set_failing(false);
    let totals = run_relay(
        &h.relay,
        Duration::from_millis(10),
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await;

    assert_eq!(totals.delivered, 1);
    assert_eq!(h.mailer.sent().await.len(), sent_before + 1);
    assert_eq!(undelivered(&h).await, 0);
}
