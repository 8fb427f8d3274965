//! Claim Lifecycle Manager
//!
//! Creates, amends and reads provider claims. Every mutation runs inside one
//! unit of work and notifies the claim's HMO through that same unit of work.
//! Every read is scoped to the acting hospital; a claim owned by another
//! hospital is reported exactly like a missing one.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{ClaimId, HospitalId};

use crate::claim::{generate_claim_reference, Claim, ClaimQueryResponse, Note, SubmitClaim};
use crate::dispatch::NotificationDispatcher;
use crate::error::ClaimError;
use crate::export;
use crate::notification::NotificationTarget;
use crate::outbox::OutboxRelay;
use crate::ports::{
    ClaimFilter, ClaimListing, ClaimQuery, ClaimStore, EligibilityResolver, Hmo, UnitOfWork,
};
use crate::response::{Actor, ServiceResponse};
use crate::transaction::TransactionOrchestrator;
use crate::views::{ClaimDetails, ClaimHistoryRow, ClaimSummaryRow, HmoContact, RemittanceAdvice};

/// Attempts at a free claim reference before giving up
const REFERENCE_ATTEMPTS: u32 = 2;

pub const CLAIM_SUBMISSION_TITLE: &str = "Claim Submission";
pub const CLAIM_QUERY_RESPONSE_TITLE: &str = "Claim Query Response";

#[derive(Clone)]
pub struct ClaimLifecycleManager {
    store: Arc<dyn ClaimStore>,
    eligibility: Arc<dyn EligibilityResolver>,
    transactions: TransactionOrchestrator,
    dispatcher: NotificationDispatcher,
    outbox: OutboxRelay,
}

impl ClaimLifecycleManager {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        eligibility: Arc<dyn EligibilityResolver>,
        outbox: OutboxRelay,
    ) -> Self {
        Self {
            transactions: TransactionOrchestrator::new(store.clone()),
            dispatcher: NotificationDispatcher::new(store.clone()),
            store,
            eligibility,
            outbox,
        }
    }

    /// Submits a new claim for an eligible enrollee
    #[instrument(skip(self, payload, actor), fields(hospital_id = %actor.hospital_id, hmo_id = %payload.hmo_id))]
    pub async fn submit_claim(
        &self,
        payload: SubmitClaim,
        actor: &Actor,
    ) -> Result<ServiceResponse<Claim>, ClaimError> {
        let this = self.clone();
        let actor = actor.clone();
        let claim = self
            .transactions
            .with_transaction("submit_claim", move |uow| {
                Box::pin(async move { this.submit_within(uow, payload, actor).await })
            })
            .await?;

        info!(claim_id = %claim.id, claim_reference = %claim.claim_reference, "claim submitted");
        self.outbox.deliver_after_commit().await;
        Ok(ServiceResponse::ok("Claim submitted successfully", claim))
    }

    async fn submit_within(
        &self,
        uow: &mut dyn UnitOfWork,
        payload: SubmitClaim,
        actor: Actor,
    ) -> Result<Claim, ClaimError> {
        let eligibility = self.eligibility.check_eligibility(&payload.enrollee_no).await?;
        if !eligibility.found {
            return Err(ClaimError::EnrolleeNotFound(payload.enrollee_no));
        }

        let hmo = uow
            .find_hmo(payload.hmo_id)
            .await?
            .ok_or_else(|| ClaimError::HmoNotFound(payload.hmo_id.to_string()))?;

        let reference = allocate_reference(uow).await?;
        let mut claim = Claim::submit(&payload, actor.hospital_id, reference);
        uow.insert_claim(&claim).await?;

        if let Some(body) = non_blank(payload.note.as_deref()) {
            let note = Note::new(claim.id, actor.user_id, body);
            uow.insert_note(&note).await?;
            claim.append_note(note);
        }

        let message = format!(
            "A new claim has been submitted for enrollee {} with reference {}.",
            claim.enrollee_no, claim.claim_reference
        );
        self.notify_hmo(&hmo, &message, CLAIM_SUBMISSION_TITLE, uow).await?;

        Ok(claim)
    }

    /// Applies a hospital's answer to an HMO query on the claim
    #[instrument(skip(self, payload, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn respond_to_claim_query(
        &self,
        claim_id: ClaimId,
        payload: ClaimQueryResponse,
        actor: &Actor,
    ) -> Result<ServiceResponse<Claim>, ClaimError> {
        let this = self.clone();
        let actor = actor.clone();
        let claim = self
            .transactions
            .with_transaction("respond_to_claim_query", move |uow| {
                Box::pin(async move { this.respond_within(uow, claim_id, payload, actor).await })
            })
            .await?;

        info!(claim_reference = %claim.claim_reference, "claim query answered");
        self.outbox.deliver_after_commit().await;
        Ok(ServiceResponse::ok("Claim query response submitted successfully", claim))
    }

    async fn respond_within(
        &self,
        uow: &mut dyn UnitOfWork,
        claim_id: ClaimId,
        payload: ClaimQueryResponse,
        actor: Actor,
    ) -> Result<Claim, ClaimError> {
        let mut claim = find_owned_claim(uow, claim_id, actor.hospital_id).await?;
        let hmo = uow
            .find_hmo(claim.hmo_id)
            .await?
            .ok_or_else(|| ClaimError::HmoNotFound(claim.hmo_id.to_string()))?;

        claim.apply_query_response(&payload);
        uow.update_claim(&claim).await?;

        if let Some(body) = non_blank(payload.note.as_deref()) {
            let note = Note::new(claim.id, actor.user_id, body);
            uow.insert_note(&note).await?;
            claim.append_note(note);
        }

        let message = format!(
            "A response has been submitted for the queried claim with reference {}.",
            claim.claim_reference
        );
        self.notify_hmo(&hmo, &message, CLAIM_QUERY_RESPONSE_TITLE, uow).await?;

        Ok(claim)
    }

    /// Attaches a pre-authorization code issued by the claim's HMO for the
    /// claim's enrollee
    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn link_claim_to_authorization(
        &self,
        claim_id: ClaimId,
        authorization_code: String,
        actor: &Actor,
    ) -> Result<ServiceResponse<Claim>, ClaimError> {
        let hospital_id = actor.hospital_id;
        let claim = self
            .transactions
            .with_transaction("link_claim_to_authorization", move |uow| {
                Box::pin(link_within(uow, claim_id, authorization_code, hospital_id))
            })
            .await?;

        info!(authorization_code = ?claim.authorization_code, "claim linked to authorization");
        Ok(ServiceResponse::ok("Claim linked to authorization successfully", claim))
    }

    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn get_claims_history(
        &self,
        actor: &Actor,
        filter: ClaimFilter,
    ) -> Result<ServiceResponse<Vec<ClaimHistoryRow>>, ClaimError> {
        let listings = self.list(ClaimQuery::scoped(actor.hospital_id, &filter)).await?;
        Ok(ServiceResponse::ok(
            "Claims history retrieved successfully",
            listings.iter().map(ClaimHistoryRow::from).collect(),
        ))
    }

    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn view_submitted_claims(
        &self,
        actor: &Actor,
        filter: ClaimFilter,
    ) -> Result<ServiceResponse<Vec<ClaimSummaryRow>>, ClaimError> {
        let listings = self.list(ClaimQuery::scoped(actor.hospital_id, &filter)).await?;
        Ok(ServiceResponse::ok(
            "Submitted claims retrieved successfully",
            summarize(&listings),
        ))
    }

    /// Claim summaries filtered by HMO and date only
    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn track_claim_payments(
        &self,
        actor: &Actor,
        filter: ClaimFilter,
    ) -> Result<ServiceResponse<Vec<ClaimSummaryRow>>, ClaimError> {
        let query = ClaimQuery {
            enrollee_no: None,
            ..ClaimQuery::scoped(actor.hospital_id, &filter)
        };
        let listings = self.list(query).await?;
        Ok(ServiceResponse::ok("Claims retrieved successfully", summarize(&listings)))
    }

    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn export_claims_history(
        &self,
        actor: &Actor,
        filter: ClaimFilter,
    ) -> Result<ServiceResponse<String>, ClaimError> {
        let listings = self.list(ClaimQuery::scoped(actor.hospital_id, &filter)).await?;
        Ok(ServiceResponse::ok(
            "Claims history exported successfully",
            export::claims_history(&summarize(&listings)),
        ))
    }

    /// Full claim view, re-checking the enrollee with the eligibility service
    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn view_claim_details(
        &self,
        claim_id: ClaimId,
        actor: &Actor,
    ) -> Result<ServiceResponse<ClaimDetails>, ClaimError> {
        let claim = self.owned_claim(claim_id, actor.hospital_id).await?;

        let eligibility = self.eligibility.check_eligibility(&claim.enrollee_no).await?;
        if !eligibility.found {
            return Err(ClaimError::EnrolleeNotFound(claim.enrollee_no));
        }
        let enrollee_name = eligibility
            .enrollee
            .map(|e| e.full_name())
            .unwrap_or_else(|| claim.enrollee_no.clone());

        let hmo = self.hmo_of(&claim).await?;
        let hospital_name = self.hospital_name(&claim).await?;

        let details = ClaimDetails {
            id: claim.id,
            enrollee_no: claim.enrollee_no.clone(),
            enrollee_name,
            hospital_name,
            claim_reference: claim.claim_reference.clone(),
            status: claim.status,
            authorization_code: claim.authorization_code.clone(),
            documents: claim.documents.clone(),
            diagnosis: claim.diagnosis.clone(),
            test_results: claim.test_results.clone(),
            discharge_summary: claim.discharge_summary.clone(),
            service_breakdown: claim.service_breakdown.clone(),
            amount: claim.total_amount(),
            hmo: HmoContact {
                id: hmo.id,
                name: hmo.name,
                contact: hmo.phone_number,
            },
            timeline: claim.timeline(),
            notes: claim.notes,
        };

        Ok(ServiceResponse::ok("Claim details retrieved successfully", details))
    }

    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn download_remittance_advice(
        &self,
        claim_id: ClaimId,
        actor: &Actor,
    ) -> Result<ServiceResponse<RemittanceAdvice>, ClaimError> {
        let claim = self.owned_claim(claim_id, actor.hospital_id).await?;
        let hmo = self.hmo_of(&claim).await?;
        let hospital_name = self.hospital_name(&claim).await?;

        let advice = RemittanceAdvice {
            amount: claim.total_amount(),
            claim_reference: claim.claim_reference,
            enrollee_no: claim.enrollee_no,
            hmo_name: hmo.name,
            hospital_name,
            status: claim.status,
        };

        Ok(ServiceResponse::ok("Remittance advice generated successfully", advice))
    }

    async fn notify_hmo(
        &self,
        hmo: &Hmo,
        message: &str,
        title: &str,
        uow: &mut dyn UnitOfWork,
    ) -> Result<(), ClaimError> {
        self.dispatcher
            .send_notification(&NotificationTarget::from(hmo), message, title, uow)
            .await
            .map(|_| ())
    }

    async fn list(&self, query: ClaimQuery) -> Result<Vec<ClaimListing>, ClaimError> {
        let listings = self.store.list_claims(&query).await?;
        debug!(count = listings.len(), "claims listed");
        Ok(listings)
    }

    async fn owned_claim(&self, claim_id: ClaimId, hospital_id: HospitalId) -> Result<Claim, ClaimError> {
        self.store
            .find_claim(claim_id)
            .await?
            .filter(|claim| claim.is_owned_by(hospital_id))
            .ok_or_else(|| ClaimError::ClaimNotFound(claim_id.to_string()))
    }

    async fn hmo_of(&self, claim: &Claim) -> Result<Hmo, ClaimError> {
        self.store
            .find_hmo(claim.hmo_id)
            .await?
            .ok_or_else(|| ClaimError::HmoNotFound(claim.hmo_id.to_string()))
    }

    async fn hospital_name(&self, claim: &Claim) -> Result<String, ClaimError> {
        let hospital = self
            .store
            .find_hospital(claim.hospital_id)
            .await?
            .ok_or_else(|| core_kernel::PortError::not_found("Hospital", claim.hospital_id))?;
        Ok(hospital.name)
    }
}

async fn link_within(
    uow: &mut dyn UnitOfWork,
    claim_id: ClaimId,
    code: String,
    hospital_id: HospitalId,
) -> Result<Claim, ClaimError> {
    let mut claim = find_owned_claim(uow, claim_id, hospital_id).await?;

    let authorization = uow
        .find_authorization(&code, claim.hmo_id)
        .await?
        .ok_or_else(|| ClaimError::AuthorizationNotFound { code: code.clone() })?;

    if authorization.enrollee_no != claim.enrollee_no {
        return Err(ClaimError::AuthorizationEnrolleeMismatch {
            code,
            enrollee_no: claim.enrollee_no,
        });
    }

    claim.link_authorization(authorization.code);
    uow.update_claim(&claim).await?;
    Ok(claim)
}

/// Loads a claim inside the unit of work, hiding claims of other hospitals
pub(crate) async fn find_owned_claim(
    uow: &mut dyn UnitOfWork,
    claim_id: ClaimId,
    hospital_id: HospitalId,
) -> Result<Claim, ClaimError> {
    uow.find_claim(claim_id)
        .await?
        .filter(|claim| claim.is_owned_by(hospital_id))
        .ok_or_else(|| ClaimError::ClaimNotFound(claim_id.to_string()))
}

async fn allocate_reference(uow: &mut dyn UnitOfWork) -> Result<String, ClaimError> {
    for attempt in 1..=REFERENCE_ATTEMPTS {
        let reference = generate_claim_reference(Utc::now());
        if !uow.claim_reference_exists(&reference).await? {
            return Ok(reference);
        }
        warn!(attempt, %reference, "claim reference already taken");
    }
    Err(ClaimError::ReferenceCollision)
}

fn summarize(listings: &[ClaimListing]) -> Vec<ClaimSummaryRow> {
    listings.iter().map(ClaimSummaryRow::from).collect()
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}
