//! Payment Reconciliation Engine
//!
//! Records payments against claims, flags discrepancies for review and
//! reports derived payment status. Status is never stored: listings derive it
//! per row and status filters are translated into amount predicates.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use core_kernel::{ClaimId, DateRange, Pagination, PortError};

use crate::claim::Note;
use crate::dispatch::NotificationDispatcher;
use crate::error::ClaimError;
use crate::export;
use crate::lifecycle::find_owned_claim;
use crate::notification::NotificationTarget;
use crate::outbox::OutboxRelay;
use crate::payment::{
    summarize_by_hmo, ClaimPayment, FlagDiscrepancy, HmoPaymentSummary, NewClaimPayment,
    PaymentFilter, PaymentRecord, PaymentStatusRow,
};
use crate::ports::{ClaimStore, IdentityResolver, PaymentQuery, Role, UnitOfWork};
use crate::response::{Actor, ServiceResponse};
use crate::transaction::TransactionOrchestrator;

/// Internal note payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddInternalNote {
    pub claim_id: ClaimId,
    pub note: String,
}

#[derive(Clone)]
pub struct PaymentReconciliationEngine {
    store: Arc<dyn ClaimStore>,
    identity: Arc<dyn IdentityResolver>,
    transactions: TransactionOrchestrator,
    dispatcher: NotificationDispatcher,
    outbox: OutboxRelay,
}

impl PaymentReconciliationEngine {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        identity: Arc<dyn IdentityResolver>,
        outbox: OutboxRelay,
    ) -> Self {
        Self {
            transactions: TransactionOrchestrator::new(store.clone()),
            dispatcher: NotificationDispatcher::new(store.clone()),
            store,
            identity,
            outbox,
        }
    }

    /// Records a fully matched payment against one of the actor's claims
    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn create_claim_payment(
        &self,
        payload: NewClaimPayment,
        actor: &Actor,
    ) -> Result<ServiceResponse<ClaimPayment>, ClaimError> {
        payload.validate(Utc::now().date_naive())?;

        let hospital_id = actor.hospital_id;
        let created_by = actor.display_name();
        let payment = self
            .transactions
            .with_transaction("create_claim_payment", move |uow| {
                Box::pin(async move {
                    find_owned_claim(uow, payload.claim_id, hospital_id).await?;
                    let payment = ClaimPayment::record(&payload, created_by);
                    uow.insert_payment(&payment).await?;
                    Ok::<_, ClaimError>(payment)
                })
            })
            .await?;

        info!(payment_id = %payment.id, claim_id = %payment.claim_id, amount = %payment.amount_paid, "claim payment recorded");
        Ok(ServiceResponse::ok("Claim payment created successfully", payment))
    }

    /// Flags the claim's current payment and notifies the reviewer and HMO
    #[instrument(skip(self, payload, actor), fields(hospital_id = %actor.hospital_id, reviewer_id = %payload.reviewer_id))]
    pub async fn flag_discrepancy(
        &self,
        claim_id: ClaimId,
        payload: FlagDiscrepancy,
        actor: &Actor,
    ) -> Result<ServiceResponse<ClaimPayment>, ClaimError> {
        let this = self.clone();
        let actor = actor.clone();
        let payment = self
            .transactions
            .with_transaction("flag_discrepancy", move |uow| {
                Box::pin(async move { this.flag_within(uow, claim_id, payload, actor).await })
            })
            .await?;

        info!(payment_id = %payment.id, "payment flagged for discrepancy");
        self.outbox.deliver_after_commit().await;
        Ok(ServiceResponse::ok("Discrepancy flagged successfully", payment))
    }

    async fn flag_within(
        &self,
        uow: &mut dyn UnitOfWork,
        claim_id: ClaimId,
        payload: FlagDiscrepancy,
        actor: Actor,
    ) -> Result<ClaimPayment, ClaimError> {
        let claim = find_owned_claim(uow, claim_id, actor.hospital_id).await?;
        let mut payment = uow
            .current_payment(claim.id)
            .await?
            .ok_or_else(|| ClaimError::PaymentNotFound(claim.id.to_string()))?;

        if payment.amount_paid == payment.amount_expected {
            return Err(ClaimError::PaymentAlreadyMatched);
        }

        let reviewer = self
            .identity
            .find_user_by_role(payload.reviewer_id, Role::ReviewAdmin)
            .await?
            .ok_or_else(|| ClaimError::ReviewerNotFound(payload.reviewer_id.to_string()))?;

        payment.flag(payload.reason.clone(), actor.user_id)?;
        uow.update_payment(&payment).await?;

        let hmo = uow
            .find_hmo(claim.hmo_id)
            .await?
            .ok_or_else(|| ClaimError::HmoNotFound(claim.hmo_id.to_string()))?;
        let hospital = uow
            .find_hospital(claim.hospital_id)
            .await?
            .ok_or_else(|| PortError::not_found("Hospital", claim.hospital_id))?;

        let title = format!(
            "Claim {} for {} has been flagged for discrepancy.",
            claim.id.as_uuid(),
            hospital.name
        );
        self.dispatcher
            .send_notification(&NotificationTarget::from(&reviewer), &payload.reason, &title, uow)
            .await?;
        self.dispatcher
            .send_notification(&NotificationTarget::from(&hmo), &payload.reason, &title, uow)
            .await?;

        Ok(payment)
    }

    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn get_claims_payment_status_for_hospital(
        &self,
        actor: &Actor,
        pagination: Pagination,
    ) -> Result<ServiceResponse<Vec<PaymentStatusRow>>, ClaimError> {
        let rows = self
            .status_rows(actor, PaymentFilter::default(), Some(pagination))
            .await?;
        Ok(ServiceResponse::ok("Claims payment status retrieved successfully", rows))
    }

    /// Payment rows narrowed by HMO name, payment date range and status
    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn filter_claims(
        &self,
        actor: &Actor,
        filter: PaymentFilter,
        pagination: Pagination,
    ) -> Result<ServiceResponse<Vec<PaymentStatusRow>>, ClaimError> {
        let rows = self.status_rows(actor, filter, Some(pagination)).await?;
        Ok(ServiceResponse::ok("Claims filtered successfully", rows))
    }

    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn download_payment_reports(
        &self,
        actor: &Actor,
        filter: PaymentFilter,
    ) -> Result<ServiceResponse<String>, ClaimError> {
        let rows = self.status_rows(actor, filter, None).await?;
        Ok(ServiceResponse::ok(
            "Payment report generated successfully",
            export::payment_report(&rows),
        ))
    }

    /// Totals per HMO over payments dated within `range`
    #[instrument(skip(self, actor), fields(hospital_id = %actor.hospital_id))]
    pub async fn generate_hmo_payment_summary(
        &self,
        actor: &Actor,
        range: DateRange,
    ) -> Result<ServiceResponse<Vec<HmoPaymentSummary>>, ClaimError> {
        let records = self.records(actor, PaymentFilter::between(range), None).await?;
        Ok(ServiceResponse::ok(
            "HMO payment summary generated successfully",
            summarize_by_hmo(&records),
        ))
    }

    /// Adds a note visible to the claim's HMO
    #[instrument(skip(self, payload, actor), fields(hospital_id = %actor.hospital_id, claim_id = %payload.claim_id))]
    pub async fn add_internal_note(
        &self,
        payload: AddInternalNote,
        actor: &Actor,
    ) -> Result<ServiceResponse<Note>, ClaimError> {
        let this = self.clone();
        let actor = actor.clone();
        let note = self
            .transactions
            .with_transaction("add_internal_note", move |uow| {
                Box::pin(async move { this.note_within(uow, payload, actor).await })
            })
            .await?;

        info!(note_id = %note.id, "internal note added");
        self.outbox.deliver_after_commit().await;
        Ok(ServiceResponse::ok("Internal note added successfully", note))
    }

    async fn note_within(
        &self,
        uow: &mut dyn UnitOfWork,
        payload: AddInternalNote,
        actor: Actor,
    ) -> Result<Note, ClaimError> {
        let claim = find_owned_claim(uow, payload.claim_id, actor.hospital_id).await?;
        let user = self
            .identity
            .find_user(actor.user_id)
            .await?
            .ok_or_else(|| ClaimError::UserNotFound(actor.user_id.to_string()))?;

        let note = Note::new(claim.id, user.id, payload.note);
        uow.insert_note(&note).await?;

        let hmo = uow
            .find_hmo(claim.hmo_id)
            .await?
            .ok_or_else(|| ClaimError::HmoNotFound(claim.hmo_id.to_string()))?;
        let title = format!(
            "Internal note added to claim {} by {} {}",
            claim.id.as_uuid(),
            user.first_name,
            user.last_name
        );
        self.dispatcher
            .send_notification(&NotificationTarget::from(&hmo), &note.body, &title, uow)
            .await?;

        Ok(note)
    }

    async fn records(
        &self,
        actor: &Actor,
        filter: PaymentFilter,
        page: Option<Pagination>,
    ) -> Result<Vec<PaymentRecord>, ClaimError> {
        let query = PaymentQuery {
            hospital_id: actor.hospital_id,
            filter,
            page,
        };
        let records = self.store.list_payments(&query).await?;
        debug!(count = records.len(), "payments listed");
        Ok(records)
    }

    async fn status_rows(
        &self,
        actor: &Actor,
        filter: PaymentFilter,
        page: Option<Pagination>,
    ) -> Result<Vec<PaymentStatusRow>, ClaimError> {
        let records = self.records(actor, filter, page).await?;
        Ok(records.iter().map(PaymentStatusRow::from).collect())
    }
}
