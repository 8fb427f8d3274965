//! Claim lifecycle tests over the in-memory store

use std::sync::Arc;

use chrono::{Days, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use core_kernel::ClaimId;
use test_utils::StaticEligibilityResolver;
use domain_claims::{
    Claim, ClaimError, ClaimFilter, ClaimLifecycleManager, ClaimQueryResponse, ClaimStatus,
    ErrorKind, NotificationRecipient, ServiceBreakdown, ServiceLine,
};
use test_utils::{
    assert_all_units_released, assert_error_kind, ClaimsHarness, PartyFixtures,
    SubmitClaimBuilder, AUTHORIZATION_CODE, ENROLLEE_NO, OTHER_ENROLLEE_NO, UNKNOWN_ENROLLEE_NO,
};

async fn submit(h: &ClaimsHarness) -> Claim {
    h.lifecycle
        .submit_claim(SubmitClaimBuilder::new(h.hmo.id).build(), &h.actor)
        .await
        .unwrap()
        .data
}

mod submission {
    use super::*;

    #[tokio::test]
    async fn test_submit_persists_pending_claim_for_actor_hospital() {
        let h = ClaimsHarness::new().await;

        let response = h
            .lifecycle
            .submit_claim(SubmitClaimBuilder::new(h.hmo.id).build(), &h.actor)
            .await
            .unwrap();

        assert!(response.status);
        assert_eq!(response.message, "Claim submitted successfully");
        let claim = response.data;
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.hospital_id, h.hospital.id);
        assert_eq!(claim.hmo_id, h.hmo.id);
        assert_eq!(claim.enrollee_no, ENROLLEE_NO);
        assert!(claim.claim_reference.starts_with("CLAIM-"));
        assert_eq!(claim.total_amount(), dec!(7500));

        let stored = h.store.claims().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].claim_reference, claim.claim_reference);
    }

    #[tokio::test]
    async fn test_submit_notifies_hmo_and_emails_after_commit() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let notifications = h.store.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].recipient, NotificationRecipient::Hmo(h.hmo.id));
        assert_eq!(notifications[0].title, "Claim Submission");
        assert_eq!(
            notifications[0].message,
            format!(
                "A new claim has been submitted for enrollee {} with reference {}.",
                ENROLLEE_NO, claim.claim_reference
            )
        );

        let sent = h.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, h.hmo.email);
        assert_eq!(sent[0].subject, "Claim Submission");

        let events = h.store.outbox_events().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_delivered());
    }

    #[tokio::test]
    async fn test_submit_with_note_appends_it() {
        let h = ClaimsHarness::new().await;
        let claim = h
            .lifecycle
            .submit_claim(
                SubmitClaimBuilder::new(h.hmo.id).with_note("Patient admitted overnight").build(),
                &h.actor,
            )
            .await
            .unwrap()
            .data;

        assert_eq!(claim.notes.len(), 1);
        assert_eq!(claim.notes[0].body, "Patient admitted overnight");
        assert_eq!(claim.notes[0].author_id, h.actor.user_id);
        assert_eq!(h.store.notes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ineligible_enrollee_persists_nothing() {
        let h = ClaimsHarness::new().await;

        let result = h
            .lifecycle
            .submit_claim(
                SubmitClaimBuilder::new(h.hmo.id)
                    .with_enrollee(UNKNOWN_ENROLLEE_NO)
                    .with_note("should not be stored")
                    .build(),
                &h.actor,
            )
            .await;

        assert_error_kind(&result, ErrorKind::NotFound);
        assert!(matches!(result, Err(ClaimError::EnrolleeNotFound(_))));
        assert!(h.store.claims().await.is_empty());
        assert!(h.store.notes().await.is_empty());
        assert!(h.store.notifications().await.is_empty());
        assert!(h.mailer.sent().await.is_empty());
        assert_all_units_released(&h.store.stats());
    }

    #[tokio::test]
    async fn test_unknown_hmo_is_not_found() {
        let h = ClaimsHarness::new().await;
        let stranger = PartyFixtures::hmo("Unregistered HMO");

        let result = h
            .lifecycle
            .submit_claim(SubmitClaimBuilder::new(stranger.id).build(), &h.actor)
            .await;

        assert!(matches!(result, Err(ClaimError::HmoNotFound(_))));
        assert!(h.store.claims().await.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_references_are_a_conflict() {
        let h = ClaimsHarness::new().await;
        h.store.take_all_references(true);

        let result = h
            .lifecycle
            .submit_claim(SubmitClaimBuilder::new(h.hmo.id).build(), &h.actor)
            .await;

        assert_error_kind(&result, ErrorKind::Conflict);
        assert!(h.store.claims().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_notification_rolls_back_claim_and_note() {
        let h = ClaimsHarness::new().await;
        h.store.fail_notification_inserts(true);

        let result = h
            .lifecycle
            .submit_claim(
                SubmitClaimBuilder::new(h.hmo.id).with_note("first visit").build(),
                &h.actor,
            )
            .await;

        assert_error_kind(&result, ErrorKind::Internal);
        assert!(h.store.claims().await.is_empty());
        assert!(h.store.notes().await.is_empty());
        assert!(h.mailer.sent().await.is_empty());

        let stats = h.store.stats();
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(stats.committed, 0);
        assert_all_units_released(&stats);
    }

    #[tokio::test]
    async fn test_failed_commit_is_internal_and_sends_nothing() {
        let h = ClaimsHarness::new().await;
        h.store.fail_commits(true);

        let result = h
            .lifecycle
            .submit_claim(SubmitClaimBuilder::new(h.hmo.id).build(), &h.actor)
            .await;

        assert!(matches!(result, Err(ClaimError::CommitFailed(_))));
        assert_error_kind(&result, ErrorKind::Internal);
        assert!(h.store.claims().await.is_empty());
        assert!(h.mailer.sent().await.is_empty());
        assert_all_units_released(&h.store.stats());
    }

    #[tokio::test]
    async fn test_nil_notification_id_skips_email() {
        let h = ClaimsHarness::new().await;
        h.store.return_nil_notification_ids(true);

        submit(&h).await;

        assert_eq!(h.store.claims().await.len(), 1);
        assert_eq!(h.store.notifications().await.len(), 1);
        assert!(h.store.outbox_events().await.is_empty());
        assert!(h.mailer.sent().await.is_empty());
    }
}

mod query_response {
    use super::*;

    #[tokio::test]
    async fn test_response_updates_fields_and_notifies_hmo() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let payload = ClaimQueryResponse {
            service_breakdown: Some(ServiceBreakdown::from_lines(&[ServiceLine::new(
                "Consultation",
                dec!(6000),
            )])),
            discharge_summary: Some("Discharged after 2 days".into()),
            note: Some("Updated consultation fee".into()),
            ..Default::default()
        };
        let updated = h
            .lifecycle
            .respond_to_claim_query(claim.id, payload, &h.actor)
            .await
            .unwrap()
            .data;

        assert_eq!(updated.total_amount(), dec!(6000));
        assert_eq!(updated.discharge_summary.as_deref(), Some("Discharged after 2 days"));
        assert_eq!(updated.diagnosis.as_deref(), Some("Malaria"));
        assert_eq!(updated.notes.len(), 1);
        assert_eq!(updated.hmo_id, claim.hmo_id);
        assert_eq!(updated.hospital_id, claim.hospital_id);

        let titles: Vec<String> = h.store.notifications().await.into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["Claim Submission", "Claim Query Response"]);

        let sent = h.mailer.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1].body,
            format!(
                "A response has been submitted for the queried claim with reference {}.",
                claim.claim_reference
            )
        );
    }

    #[tokio::test]
    async fn test_other_hospital_cannot_respond() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let result = h
            .lifecycle
            .respond_to_claim_query(claim.id, ClaimQueryResponse::default(), &h.other_actor)
            .await;

        assert!(matches!(result, Err(ClaimError::ClaimNotFound(_))));
        assert_eq!(h.store.notifications().await.len(), 1);
    }
}

mod authorization {
    use super::*;

    #[tokio::test]
    async fn test_link_sets_code() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let linked = h
            .lifecycle
            .link_claim_to_authorization(claim.id, AUTHORIZATION_CODE.into(), &h.actor)
            .await
            .unwrap()
            .data;

        assert_eq!(linked.authorization_code.as_deref(), Some(AUTHORIZATION_CODE));
        let stored = h.store.claims().await;
        assert_eq!(stored[0].authorization_code.as_deref(), Some(AUTHORIZATION_CODE));
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let result = h
            .lifecycle
            .link_claim_to_authorization(claim.id, "AUTH-MISSING".into(), &h.actor)
            .await;

        assert!(matches!(result, Err(ClaimError::AuthorizationNotFound { .. })));
        assert_error_kind(&result, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_code_from_another_hmo_is_not_found() {
        let h = ClaimsHarness::new().await;
        h.store
            .add_authorization(PartyFixtures::authorization("AUTH-AVON", &h.other_hmo, ENROLLEE_NO))
            .await;
        let claim = submit(&h).await;

        let result = h
            .lifecycle
            .link_claim_to_authorization(claim.id, "AUTH-AVON".into(), &h.actor)
            .await;

        assert!(matches!(result, Err(ClaimError::AuthorizationNotFound { .. })));
    }

    #[tokio::test]
    async fn test_code_for_another_enrollee_is_rejected() {
        let h = ClaimsHarness::new().await;
        let claim = h
            .lifecycle
            .submit_claim(
                SubmitClaimBuilder::new(h.hmo.id).with_enrollee(OTHER_ENROLLEE_NO).build(),
                &h.actor,
            )
            .await
            .unwrap()
            .data;

        let result = h
            .lifecycle
            .link_claim_to_authorization(claim.id, AUTHORIZATION_CODE.into(), &h.actor)
            .await;

        assert!(matches!(result, Err(ClaimError::AuthorizationEnrolleeMismatch { .. })));
        assert_error_kind(&result, ErrorKind::NotFound);
        assert!(h.store.claims().await[0].authorization_code.is_none());
    }

    #[tokio::test]
    async fn test_other_hospital_cannot_link() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let result = h
            .lifecycle
            .link_claim_to_authorization(claim.id, AUTHORIZATION_CODE.into(), &h.other_actor)
            .await;

        assert!(matches!(result, Err(ClaimError::ClaimNotFound(_))));
    }
}

mod reads {
    use super::*;

    #[tokio::test]
    async fn test_listings_never_cross_hospitals() {
        let h = ClaimsHarness::new().await;
        submit(&h).await;
        h.lifecycle
            .submit_claim(SubmitClaimBuilder::new(h.hmo.id).build(), &h.other_actor)
            .await
            .unwrap();

        let ours = h
            .lifecycle
            .view_submitted_claims(&h.actor, ClaimFilter::default())
            .await
            .unwrap()
            .data;
        let theirs = h
            .lifecycle
            .view_submitted_claims(&h.other_actor, ClaimFilter::default())
            .await
            .unwrap()
            .data;

        assert_eq!(ours.len(), 1);
        assert_eq!(theirs.len(), 1);
        assert_ne!(ours[0].id, theirs[0].id);
    }

    #[tokio::test]
    async fn test_filters_by_hmo_enrollee_and_date() {
        let h = ClaimsHarness::new().await;
        submit(&h).await;
        h.lifecycle
            .submit_claim(
                SubmitClaimBuilder::new(h.other_hmo.id).with_enrollee(OTHER_ENROLLEE_NO).build(),
                &h.actor,
            )
            .await
            .unwrap();

        let by_hmo = ClaimFilter {
            hmo_id: Some(h.other_hmo.id),
            ..Default::default()
        };
        let rows = h.lifecycle.view_submitted_claims(&h.actor, by_hmo).await.unwrap().data;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hmo_name, "Avon HMO");

        let by_enrollee = ClaimFilter {
            enrollee_no: Some(ENROLLEE_NO.into()),
            ..Default::default()
        };
        let rows = h.lifecycle.get_claims_history(&h.actor, by_enrollee).await.unwrap().data;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].summary.enrollee_no, ENROLLEE_NO);
        assert_eq!(rows[0].amount, dec!(7500));

        let today = ClaimFilter {
            date: Some(Utc::now().date_naive()),
            ..Default::default()
        };
        assert_eq!(h.lifecycle.view_submitted_claims(&h.actor, today).await.unwrap().data.len(), 2);

        let yesterday = ClaimFilter {
            date: Some(Utc::now().date_naive() - Days::new(1)),
            ..Default::default()
        };
        assert!(h.lifecycle.view_submitted_claims(&h.actor, yesterday).await.unwrap().data.is_empty());
    }

    #[tokio::test]
    async fn test_track_claim_payments_ignores_enrollee_filter() {
        let h = ClaimsHarness::new().await;
        submit(&h).await;

        let filter = ClaimFilter {
            enrollee_no: Some(OTHER_ENROLLEE_NO.into()),
            ..Default::default()
        };
        let tracked = h.lifecycle.track_claim_payments(&h.actor, filter.clone()).await.unwrap();
        let submitted = h.lifecycle.view_submitted_claims(&h.actor, filter).await.unwrap();

        assert_eq!(tracked.message, "Claims retrieved successfully");
        assert_eq!(tracked.data.len(), 1);
        assert!(submitted.data.is_empty());
    }

    #[tokio::test]
    async fn test_export_renders_header_and_rows() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let csv = h
            .lifecycle
            .export_claims_history(&h.actor, ClaimFilter::default())
            .await
            .unwrap()
            .data;
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "id,enrolleeNo,claimReference,status,hmoName,createdAt");
        assert!(lines[1].starts_with(&format!(
            "{},{},{},Pending,Hygeia HMO,",
            claim.id.as_uuid(),
            ENROLLEE_NO,
            claim.claim_reference
        )));
    }

    #[tokio::test]
    async fn test_history_total_is_zero_for_non_list_breakdown() {
        let h = ClaimsHarness::new().await;
        h.lifecycle
            .submit_claim(
                SubmitClaimBuilder::new(h.hmo.id)
                    .with_raw_breakdown(json!({"amount": 5000}))
                    .build(),
                &h.actor,
            )
            .await
            .unwrap();

        let rows = h
            .lifecycle
            .get_claims_history(&h.actor, ClaimFilter::default())
            .await
            .unwrap()
            .data;
        assert_eq!(rows[0].amount, Decimal::ZERO);
    }
}

mod details {
    use super::*;

    #[tokio::test]
    async fn test_details_include_timeline_total_and_contacts() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let details = h
            .lifecycle
            .view_claim_details(claim.id, &h.actor)
            .await
            .unwrap()
            .data;

        assert_eq!(details.enrollee_name, "Chidi Okeke");
        assert_eq!(details.hospital_name, "St Nicholas Hospital");
        assert_eq!(details.hmo.name, "Hygeia HMO");
        assert_eq!(details.hmo.contact, h.hmo.phone_number);
        assert_eq!(details.amount, dec!(7500));
        assert_eq!(details.timeline.len(), 1);
        assert_eq!(details.timeline[0].status, "Submitted");
        assert_eq!(details.timeline[0].date, claim.created_at);
    }

    #[tokio::test]
    async fn test_timeline_follows_status_history() {
        let h = ClaimsHarness::new().await;
        let mut claim = submit(&h).await;
        let decided = claim.created_at + chrono::Duration::hours(6);
        claim.record_status(ClaimStatus::Approved, decided);
        h.store.seed_claim(claim.clone()).await;

        let details = h.lifecycle.view_claim_details(claim.id, &h.actor).await.unwrap().data;
        let statuses: Vec<&str> = details.timeline.iter().map(|t| t.status.as_str()).collect();
        assert_eq!(statuses, vec!["Submitted", "Approved"]);
        assert_eq!(details.status, ClaimStatus::Approved);
    }

    #[tokio::test]
    async fn test_note_round_trip_appears_once_and_keeps_total() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        h.reconciliation
            .add_internal_note(
                domain_claims::AddInternalNote {
                    claim_id: claim.id,
                    note: "Awaiting HMO approval".into(),
                },
                &h.actor,
            )
            .await
            .unwrap();

        let details = h.lifecycle.view_claim_details(claim.id, &h.actor).await.unwrap().data;
        let matching: Vec<_> = details
            .notes
            .iter()
            .filter(|n| n.body == "Awaiting HMO approval")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(details.amount, claim.total_amount());
    }

    #[tokio::test]
    async fn test_other_hospital_sees_not_found() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let result = h.lifecycle.view_claim_details(claim.id, &h.other_actor).await;
        assert!(matches!(result, Err(ClaimError::ClaimNotFound(_))));

        let missing = h.lifecycle.view_claim_details(ClaimId::new(), &h.actor).await;
        assert!(matches!(missing, Err(ClaimError::ClaimNotFound(_))));
    }

    #[tokio::test]
    async fn test_enrollee_no_longer_eligible_is_not_found() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let without_enrollee = ClaimLifecycleManager::new(
            h.store.clone(),
            Arc::new(StaticEligibilityResolver::new()),
            h.relay.clone(),
        );
        let result = without_enrollee.view_claim_details(claim.id, &h.actor).await;

        assert!(matches!(result, Err(ClaimError::EnrolleeNotFound(_))));
    }

    #[tokio::test]
    async fn test_remittance_advice() {
        let h = ClaimsHarness::new().await;
        let claim = submit(&h).await;

        let response = h.lifecycle.download_remittance_advice(claim.id, &h.actor).await.unwrap();
        assert_eq!(response.message, "Remittance advice generated successfully");
        let advice = response.data;
        assert_eq!(advice.claim_reference, claim.claim_reference);
        assert_eq!(advice.hmo_name, "Hygeia HMO");
        assert_eq!(advice.hospital_name, "St Nicholas Hospital");
        assert_eq!(advice.amount, dec!(7500));

        let result = h.lifecycle.download_remittance_advice(claim.id, &h.other_actor).await;
        assert!(matches!(result, Err(ClaimError::ClaimNotFound(_))));
    }
}
