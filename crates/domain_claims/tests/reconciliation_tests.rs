//! Payment reconciliation tests

use chrono::{Days, Utc};
use rust_decimal_macros::dec;

use core_kernel::{DateRange, Pagination, UserId};
use domain_claims::{
    AddInternalNote, Claim, ClaimError, ErrorKind, FlagDiscrepancy, NewClaimPayment,
    NotificationRecipient, PaymentFilter, PaymentStatus,
};
use test_utils::{
    assert_all_units_released, assert_error_kind, days_ago, ClaimsHarness, PaymentBuilder,
    SubmitClaimBuilder,
};

async fn submit(h: &ClaimsHarness) -> Claim {
    h.lifecycle
        .submit_claim(SubmitClaimBuilder::new(h.hmo.id).build(), &h.actor)
        .await
        .unwrap()
        .data
}

async fn submit_to_other_hmo(h: &ClaimsHarness) -> Claim {
    h.lifecycle
        .submit_claim(SubmitClaimBuilder::new(h.other_hmo.id).build(), &h.actor)
        .await
        .unwrap()
        .data
}

fn flag_request(h: &ClaimsHarness) -> FlagDiscrepancy {
    FlagDiscrepancy {
        reason: "Paid amount short by 50".to_string(),
        reviewer_id: h.reviewer.id,
    }
}

fn all() -> Pagination {
    Pagination::new(1, 100)
}

mod payments {
    use super::*;

    #[tokio::test]
    async fn test_create_payment_records_matched_amounts() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let response = h
            .reconciliation
            .create_claim_payment(
                NewClaimPayment {
                    claim_id: claim.id,
                    amount: dec!(7500),
                    payment_date: days_ago(2),
                },
                &h.actor,
            )
            .await
            .unwrap();

        assert_eq!(response.message, "Claim payment created successfully");
        let payment = response.data;
        assert_eq!(payment.amount_expected, dec!(7500));
        assert_eq!(payment.amount_paid, dec!(7500));
        assert_eq!(payment.status(), PaymentStatus::Paid);
        assert_eq!(payment.created_by, "Ada Obi");
        assert!(!payment.is_flagged);
        assert_eq!(h.store.payments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_payment_dated_today_is_accepted() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let result = h
            .reconciliation
            .create_claim_payment(
                NewClaimPayment {
                    claim_id: claim.id,
                    amount: dec!(1),
                    payment_date: Utc::now().date_naive(),
                },
                &h.actor,
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_payments_are_rejected_before_storage() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        let begun = h.store.stats().begun;

        for (amount, payment_date) in [
            (dec!(0), days_ago(1)),
            (dec!(-10), days_ago(1)),
            (dec!(100), Utc::now().date_naive() + Days::new(1)),
        ] {
            let result = h
                .reconciliation
                .create_claim_payment(
                    NewClaimPayment {
                        claim_id: claim.id,
                        amount,
                        payment_date,
                    },
                    &h.actor,
                )
                .await;
            assert_error_kind(&result, ErrorKind::InvalidInput);
        }

        assert!(h.store.payments().await.is_empty());
        assert_eq!(h.store.stats().begun, begun);
    }

    #[tokio::test]
    async fn test_payment_against_other_hospital_claim_is_not_found() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let result = h
            .reconciliation
            .create_claim_payment(
                NewClaimPayment {
                    claim_id: claim.id,
                    amount: dec!(100),
                    payment_date: days_ago(1),
                },
                &h.other_actor,
            )
            .await;

        assert!(matches!(result, Err(ClaimError::ClaimNotFound(_))));
        assert!(h.store.payments().await.is_empty());
    }
}

mod discrepancy {
    use super::*;

    #[tokio::test]
    async fn test_flag_marks_payment_and_notifies_reviewer_and_hmo() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(claim.id).amounts(dec!(100), dec!(50)).build())
            .await;

        let payment = h
            .reconciliation
            .flag_discrepancy(claim.id, flag_request(&h), &h.actor)
            .await
            .unwrap()
            .data;

        assert!(payment.is_flagged);
        assert_eq!(payment.flag_reason.as_deref(), Some("Paid amount short by 50"));
        assert_eq!(payment.flagged_by, Some(h.actor.user_id));
        assert!(h.store.payments().await[0].is_flagged);

        let title = format!(
            "Claim {} for St Nicholas Hospital has been flagged for discrepancy.",
            claim.id.as_uuid()
        );
        let flagged: Vec<_> = h
            .store
            .notifications()
            .await
            .into_iter()
            .filter(|n| n.title == title)
            .collect();
        assert_eq!(flagged.len(), 2);
        assert!(flagged.iter().all(|n| n.message == "Paid amount short by 50"));
        assert!(flagged.iter().any(|n| n.recipient == NotificationRecipient::User(h.reviewer.id)));
        assert!(flagged.iter().any(|n| n.recipient == NotificationRecipient::Hmo(h.hmo.id)));

        let recipients: Vec<String> = h
            .mailer
            .sent()
            .await
            .into_iter()
            .filter(|m| m.subject == title)
            .map(|m| m.to)
            .collect();
        assert!(recipients.contains(&h.reviewer.email));
        assert!(recipients.contains(&h.hmo.email));
    }

    #[tokio::test]
    async fn test_flagger_is_the_acting_user_not_the_reviewer() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(claim.id).amounts(dec!(100), dec!(50)).build())
            .await;

        h.reconciliation
            .flag_discrepancy(claim.id, flag_request(&h), &h.actor)
            .await
            .unwrap();

        let stored = h.store.payments().await.remove(0);
        assert_ne!(h.actor.user_id, h.reviewer.id);
        assert_eq!(stored.flagged_by, Some(h.actor.user_id));
    }

    #[tokio::test]
    async fn test_matched_payment_cannot_be_flagged() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(claim.id).amounts(dec!(100), dec!(100)).build())
            .await;

        let result = h
            .reconciliation
            .flag_discrepancy(claim.id, flag_request(&h), &h.actor)
            .await;

        assert!(matches!(result, Err(ClaimError::PaymentAlreadyMatched)));
        assert_error_kind(&result, ErrorKind::Forbidden);
        assert!(!h.store.payments().await[0].is_flagged);
    }

    #[tokio::test]
    async fn test_claim_without_payment_is_not_found() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let result = h
            .reconciliation
            .flag_discrepancy(claim.id, flag_request(&h), &h.actor)
            .await;

        assert!(matches!(result, Err(ClaimError::PaymentNotFound(_))));
    }

    #[tokio::test]
    async fn test_reviewer_must_hold_review_role() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(claim.id).amounts(dec!(100), dec!(0)).build())
            .await;

        for reviewer_id in [h.staff.id, UserId::new()] {
            let result = h
                .reconciliation
                .flag_discrepancy(
                    claim.id,
                    FlagDiscrepancy {
                        reason: "short".into(),
                        reviewer_id,
                    },
                    &h.actor,
                )
                .await;
            assert!(matches!(result, Err(ClaimError::ReviewerNotFound(_))));
        }
        assert!(!h.store.payments().await[0].is_flagged);
    }

    #[tokio::test]
    async fn test_most_recent_payment_is_flagged() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        let older = PaymentBuilder::new(claim.id)
            .amounts(dec!(100), dec!(100))
            .on(days_ago(10))
            .created_at(Utc::now() - chrono::Duration::days(10))
            .build();
        let newer = PaymentBuilder::new(claim.id)
            .amounts(dec!(100), dec!(40))
            .on(days_ago(1))
            .build();
        h.store.seed_payment(older.clone()).await;
        h.store.seed_payment(newer.clone()).await;

        let flagged = h
            .reconciliation
            .flag_discrepancy(claim.id, flag_request(&h), &h.actor)
            .await
            .unwrap()
            .data;

        assert_eq!(flagged.id, newer.id);
    }

    #[tokio::test]
    async fn test_failed_notification_leaves_payment_unflagged() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(claim.id).amounts(dec!(100), dec!(50)).build())
            .await;
        let emails_before = h.mailer.sent().await.len();
        h.store.fail_notification_inserts(true);

        let result = h
            .reconciliation
            .flag_discrepancy(claim.id, flag_request(&h), &h.actor)
            .await;

        assert_error_kind(&result, ErrorKind::Internal);
        assert!(!h.store.payments().await[0].is_flagged);
        assert_eq!(h.mailer.sent().await.len(), emails_before);
        assert_all_units_released(&h.store.stats());
    }
}

mod reporting {
    use super::*;

    #[tokio::test]
    async fn test_status_rows_derive_from_amounts() {
        let h = ClaimsHarness::new().await;
        let paid = submit(&h).await;
        let partial = submit(&h).await;
        let unpaid = submit(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(paid.id).amounts(dec!(100), dec!(100)).on(days_ago(3)).build())
            .await;
        h.store
            .seed_payment(PaymentBuilder::new(partial.id).amounts(dec!(100), dec!(30)).on(days_ago(2)).build())
            .await;
        h.store
            .seed_payment(PaymentBuilder::new(unpaid.id).amounts(dec!(100), dec!(0)).on(days_ago(1)).build())
            .await;

        let rows = h
            .reconciliation
            .get_claims_payment_status_for_hospital(&h.actor, all())
            .await
            .unwrap()
            .data;

        let statuses: Vec<PaymentStatus> = rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![PaymentStatus::Paid, PaymentStatus::PartiallyPaid, PaymentStatus::Unpaid]
        );
        assert!(rows.iter().all(|r| r.hmo_name == "Hygeia HMO"));

        let first_page = h
            .reconciliation
            .get_claims_payment_status_for_hospital(&h.actor, Pagination::new(1, 2))
            .await
            .unwrap()
            .data;
        assert_eq!(first_page.len(), 2);

        let theirs = h
            .reconciliation
            .get_claims_payment_status_for_hospital(&h.other_actor, all())
            .await
            .unwrap()
            .data;
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn test_filter_by_status_hmo_and_dates() {
        let h = ClaimsHarness::new().await;
        let a = submit(&h).await;
        let b = submit_to_other_hmo(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(a.id).amounts(dec!(100), dec!(60)).on(days_ago(20)).build())
            .await;
        h.store
            .seed_payment(PaymentBuilder::new(b.id).amounts(dec!(80), dec!(80)).on(days_ago(2)).build())
            .await;

        let partial = PaymentFilter {
            status: Some(PaymentStatus::PartiallyPaid),
            ..Default::default()
        };
        let rows = h.reconciliation.filter_claims(&h.actor, partial, all()).await.unwrap().data;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].claim_id, a.id);

        let unpaid = PaymentFilter {
            status: Some(PaymentStatus::Unpaid),
            ..Default::default()
        };
        assert!(h.reconciliation.filter_claims(&h.actor, unpaid, all()).await.unwrap().data.is_empty());

        let avon = PaymentFilter {
            hmo_name: Some("Avon HMO".into()),
            ..Default::default()
        };
        let rows = h.reconciliation.filter_claims(&h.actor, avon, all()).await.unwrap().data;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PaymentStatus::Paid);

        let last_week = PaymentFilter::between(DateRange::between(days_ago(7), days_ago(0)).unwrap());
        let rows = h.reconciliation.filter_claims(&h.actor, last_week, all()).await.unwrap().data;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].claim_id, b.id);
    }

    #[tokio::test]
    async fn test_payment_report_has_header_and_rows() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(claim.id).amounts(dec!(100), dec!(50)).on(days_ago(1)).build())
            .await;

        let report = h
            .reconciliation
            .download_payment_reports(&h.actor, PaymentFilter::default())
            .await
            .unwrap()
            .data;
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], "claimId,hmoName,amountExpected,amountPaid,status,paymentDate");
        assert_eq!(
            lines[1],
            format!("{},Hygeia HMO,100,50,PARTIALLY_PAID,{}", claim.id.as_uuid(), days_ago(1))
        );
    }

    #[tokio::test]
    async fn test_hmo_summary_totals() {
        let h = ClaimsHarness::new().await;
        let first = submit(&h).await;
        let second = submit(&h).await;
        let outside = submit_to_other_hmo(&h).await;
        h.store
            .seed_payment(PaymentBuilder::new(first.id).amounts(dec!(100), dec!(50)).on(days_ago(3)).build())
            .await;
        h.store
            .seed_payment(PaymentBuilder::new(second.id).amounts(dec!(70), dec!(70)).on(days_ago(2)).build())
            .await;
        h.store
            .seed_payment(PaymentBuilder::new(outside.id).amounts(dec!(10), dec!(10)).on(days_ago(40)).build())
            .await;

        let range = DateRange::between(days_ago(30), days_ago(0)).unwrap();
        let summary = h
            .reconciliation
            .generate_hmo_payment_summary(&h.actor, range)
            .await
            .unwrap()
            .data;

        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].hmo_name, "Hygeia HMO");
        assert_eq!(summary[0].total_claims, 2);
        assert_eq!(summary[0].total_paid, dec!(120));
        assert_eq!(summary[0].outstanding_balance, dec!(50));
    }
}

mod internal_notes {
    use super::*;

    #[tokio::test]
    async fn test_note_is_stored_and_hmo_notified() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let note = h
            .reconciliation
            .add_internal_note(
                AddInternalNote {
                    claim_id: claim.id,
                    note: "Called HMO about the shortfall".into(),
                },
                &h.actor,
            )
            .await
            .unwrap()
            .data;

        assert_eq!(note.author_id, h.staff.id);
        assert_eq!(h.store.notes().await, vec![note.clone()]);

        let last = h.store.notifications().await.pop().unwrap();
        assert_eq!(
            last.title,
            format!("Internal note added to claim {} by Ada Obi", claim.id.as_uuid())
        );
        assert_eq!(last.message, "Called HMO about the shortfall");
        assert_eq!(last.recipient, NotificationRecipient::Hmo(h.hmo.id));
    }

    #[tokio::test]
    async fn test_unknown_user_cannot_add_note() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;
        let mut stranger = h.actor.clone();
        stranger.user_id = UserId::new();

        let result = h
            .reconciliation
            .add_internal_note(
                AddInternalNote {
                    claim_id: claim.id,
                    note: "hello".into(),
                },
                &stranger,
            )
            .await;

        assert!(matches!(result, Err(ClaimError::UserNotFound(_))));
        assert!(h.store.notes().await.is_empty());
    }
}
