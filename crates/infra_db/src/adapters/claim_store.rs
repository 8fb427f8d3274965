//! PostgreSQL Claim Store Adapter
//!
//! Implements the claims domain's `ClaimStore` and `UnitOfWork` ports on top
//! of the SQL in [`crate::repositories`].
//!
//! # Units of work
//!
//! `begin()` opens a database transaction and hands it out as a
//! [`PgUnitOfWork`]. The transaction is taken out of the unit of work on
//! `commit` or `rollback`; if the unit of work is dropped while still open,
//! SQLx rolls the transaction back and returns the connection to the pool.
//!
//! # Error Handling
//!
//! Database errors are translated to `PortError`:
//! - unique violations (a duplicate claim reference) -> `PortError::Conflict`
//! - connection loss -> `PortError::Connection`
//! - waiting past the pool's acquire timeout -> `PortError::Timeout`
//! - everything else -> `PortError::Internal`

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use core_kernel::{
    AdapterHealth, ClaimId, DomainPort, HealthCheckResult, HealthCheckable, HmoId, HospitalId,
    NoteId, NotificationId, OutboxEventId, Pagination, PaymentId, PortError, PreAuthRequestId,
    UserId,
};
use domain_claims::ports::{ClaimListing, ClaimQuery, PaymentQuery};
use domain_claims::{
    Authorization, Claim, ClaimPayment, ClaimStatus, ClaimStore, Hmo, Hospital, Note,
    Notification, NotificationRecipient, NotificationStatus, OutboxEvent, PaymentRecord,
    ServiceBreakdown, StatusChange, UnitOfWork,
};

use crate::error::{acquire_error, port_error};
use crate::repositories::claims::{self as claims_sql, ClaimRow, NoteRow, PaymentRow, StatusHistoryRow};
use crate::repositories::directory::{self as directory_sql, AuthorizationRow, OrganisationRow};
use crate::repositories::notifications::{self as notifications_sql, NotificationRow, OutboxRow};

const ADAPTER_ID: &str = "postgres-claim-store";

/// A health check slower than this reports the store as degraded
const DEGRADED_LATENCY_MS: u64 = 250;

/// PostgreSQL-backed storage gateway for the claims services
#[derive(Debug, Clone)]
pub struct PostgresClaimStore {
    pool: PgPool,
}

impl PostgresClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn connection(&self) -> Result<PoolConnection<Postgres>, PortError> {
        let started = Instant::now();
        self.pool.acquire().await.map_err(|e| acquire_error(e, started))
    }
}

impl DomainPort for PostgresClaimStore {}

#[async_trait]
impl HealthCheckable for PostgresClaimStore {
    /// Runs `SELECT 1` against the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = health_status(result.map(|_| ()), latency_ms);
        HealthCheckResult {
            adapter_id: ADAPTER_ID.to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ClaimStore for PostgresClaimStore {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, PortError> {
        let started = Instant::now();
        let tx = self.pool.begin().await.map_err(|e| acquire_error(e, started))?;
        debug!("transaction opened");
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }

    async fn find_claim(&self, id: ClaimId) -> Result<Option<Claim>, PortError> {
        let mut conn = self.connection().await?;
        load_claim(&mut conn, id).await
    }

    async fn find_hmo(&self, id: HmoId) -> Result<Option<Hmo>, PortError> {
        let mut conn = self.connection().await?;
        let row = directory_sql::find_hmo(&mut conn, *id.as_uuid())
            .await
            .map_err(port_error)?;
        Ok(row.map(hmo_from_row))
    }

    async fn find_hospital(&self, id: HospitalId) -> Result<Option<Hospital>, PortError> {
        let mut conn = self.connection().await?;
        let row = directory_sql::find_hospital(&mut conn, *id.as_uuid())
            .await
            .map_err(port_error)?;
        Ok(row.map(hospital_from_row))
    }

    #[instrument(skip(self))]
    async fn list_claims(&self, query: &ClaimQuery) -> Result<Vec<ClaimListing>, PortError> {
        let mut conn = self.connection().await?;
        let rows = claims_sql::list_claims(&mut conn, query)
            .await
            .map_err(port_error)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.claim.id).collect();
        let mut notes = group_by_claim(
            claims_sql::notes_for(&mut conn, &ids).await.map_err(port_error)?,
            |n| n.claim_id,
        );
        let mut history = group_by_claim(
            claims_sql::status_history_for(&mut conn, &ids)
                .await
                .map_err(port_error)?,
            |h| h.claim_id,
        );

        rows.into_iter()
            .map(|row| {
                let id = row.claim.id;
                Ok(ClaimListing {
                    claim: claim_from_rows(
                        row.claim,
                        notes.remove(&id).unwrap_or_default(),
                        history.remove(&id).unwrap_or_default(),
                    )?,
                    hmo_name: row.hmo_name,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn list_payments(&self, query: &PaymentQuery) -> Result<Vec<PaymentRecord>, PortError> {
        let mut conn = self.connection().await?;
        let rows = claims_sql::list_payments(&mut conn, query)
            .await
            .map_err(port_error)?;
        Ok(rows
            .into_iter()
            .map(|row| PaymentRecord {
                payment: payment_from_row(row.payment),
                hmo_name: row.hmo_name,
            })
            .collect())
    }

    async fn list_notifications(
        &self,
        hospital_id: HospitalId,
        page: Pagination,
    ) -> Result<(Vec<Notification>, u64), PortError> {
        let mut conn = self.connection().await?;
        let (rows, total) = notifications_sql::list_for_hospital(&mut conn, *hospital_id.as_uuid(), page)
            .await
            .map_err(port_error)?;
        let notifications = rows
            .into_iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((notifications, u64::try_from(total).unwrap_or_default()))
    }

    async fn find_notification(&self, id: NotificationId) -> Result<Option<Notification>, PortError> {
        let mut conn = self.connection().await?;
        notifications_sql::find_notification(&mut conn, *id.as_uuid())
            .await
            .map_err(port_error)?
            .map(notification_from_row)
            .transpose()
    }

    async fn claim_outbox_events(
        &self,
        limit: u32,
        max_attempts: u32,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>, PortError> {
        let mut conn = self.connection().await?;
        let lease_secs = lease.num_milliseconds() as f64 / 1000.0;
        let rows = notifications_sql::claim_outbox_events(&mut conn, limit, max_attempts, lease_secs)
            .await
            .map_err(port_error)?;
        debug!(claimed = rows.len(), "outbox events leased");
        Ok(rows.into_iter().map(outbox_from_row).collect())
    }

    async fn mark_outbox_delivered(
        &self,
        id: OutboxEventId,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), PortError> {
        let mut conn = self.connection().await?;
        notifications_sql::mark_outbox_delivered(&mut conn, *id.as_uuid(), delivered_at)
            .await
            .map_err(port_error)
    }

    async fn record_outbox_failure(&self, id: OutboxEventId, error: &str) -> Result<(), PortError> {
        let mut conn = self.connection().await?;
        let touched = notifications_sql::record_outbox_failure(&mut conn, *id.as_uuid(), error)
            .await
            .map_err(port_error)?;
        if touched == 0 {
            return Err(PortError::not_found("OutboxEvent", id));
        }
        Ok(())
    }
}

/// A database transaction behind the `UnitOfWork` port
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn conn(&mut self) -> Result<&mut PgConnection, PortError> {
        self.tx
            .as_mut()
            .map(|tx| &mut **tx)
            .ok_or(PortError::TransactionClosed)
    }
}

impl Drop for PgUnitOfWork {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("unit of work dropped while open; transaction will be rolled back");
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_claim(&mut self, id: ClaimId) -> Result<Option<Claim>, PortError> {
        load_claim(self.conn()?, id).await
    }

    async fn find_hmo(&mut self, id: HmoId) -> Result<Option<Hmo>, PortError> {
        let row = directory_sql::find_hmo(self.conn()?, *id.as_uuid())
            .await
            .map_err(port_error)?;
        Ok(row.map(hmo_from_row))
    }

    async fn find_hospital(&mut self, id: HospitalId) -> Result<Option<Hospital>, PortError> {
        let row = directory_sql::find_hospital(self.conn()?, *id.as_uuid())
            .await
            .map_err(port_error)?;
        Ok(row.map(hospital_from_row))
    }

    async fn find_authorization(
        &mut self,
        code: &str,
        hmo_id: HmoId,
    ) -> Result<Option<Authorization>, PortError> {
        let row = directory_sql::find_authorization(self.conn()?, code, *hmo_id.as_uuid())
            .await
            .map_err(port_error)?;
        Ok(row.map(authorization_from_row))
    }

    async fn claim_reference_exists(&mut self, reference: &str) -> Result<bool, PortError> {
        claims_sql::claim_reference_exists(self.conn()?, reference)
            .await
            .map_err(port_error)
    }

    async fn insert_claim(&mut self, claim: &Claim) -> Result<(), PortError> {
        claims_sql::insert_claim(self.conn()?, claim)
            .await
            .map_err(port_error)
    }

    async fn update_claim(&mut self, claim: &Claim) -> Result<(), PortError> {
        let touched = claims_sql::update_claim(self.conn()?, claim)
            .await
            .map_err(port_error)?;
        if touched == 0 {
            return Err(PortError::not_found("ProviderClaim", claim.id));
        }
        Ok(())
    }

    async fn insert_note(&mut self, note: &Note) -> Result<(), PortError> {
        claims_sql::insert_note(self.conn()?, note)
            .await
            .map_err(port_error)
    }

    async fn current_payment(&mut self, claim_id: ClaimId) -> Result<Option<ClaimPayment>, PortError> {
        let row = claims_sql::current_payment(self.conn()?, *claim_id.as_uuid())
            .await
            .map_err(port_error)?;
        Ok(row.map(payment_from_row))
    }

    async fn insert_payment(&mut self, payment: &ClaimPayment) -> Result<(), PortError> {
        claims_sql::insert_payment(self.conn()?, payment)
            .await
            .map_err(port_error)
    }

    async fn update_payment(&mut self, payment: &ClaimPayment) -> Result<(), PortError> {
        let touched = claims_sql::update_payment(self.conn()?, payment)
            .await
            .map_err(port_error)?;
        if touched == 0 {
            return Err(PortError::not_found("ClaimPayment", payment.id));
        }
        Ok(())
    }

    async fn insert_notification(
        &mut self,
        notification: &Notification,
    ) -> Result<NotificationId, PortError> {
        let id = notifications_sql::insert_notification(self.conn()?, notification)
            .await
            .map_err(port_error)?;
        Ok(NotificationId::from_uuid(id))
    }

    async fn insert_outbox_event(&mut self, event: &OutboxEvent) -> Result<(), PortError> {
        notifications_sql::insert_outbox_event(self.conn()?, event)
            .await
            .map_err(port_error)
    }

    async fn commit(&mut self) -> Result<(), PortError> {
        let tx = self.tx.take().ok_or(PortError::TransactionClosed)?;
        tx.commit().await.map_err(port_error)
    }

    async fn rollback(&mut self) -> Result<(), PortError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(port_error),
            None => Ok(()),
        }
    }
}

async fn load_claim(conn: &mut PgConnection, id: ClaimId) -> Result<Option<Claim>, PortError> {
    let Some(row) = claims_sql::find_claim(conn, *id.as_uuid())
        .await
        .map_err(port_error)?
    else {
        return Ok(None);
    };

    let ids = [row.id];
    let notes = claims_sql::notes_for(conn, &ids).await.map_err(port_error)?;
    let history = claims_sql::status_history_for(conn, &ids)
        .await
        .map_err(port_error)?;
    claim_from_rows(row, notes, history).map(Some)
}

fn group_by_claim<T>(rows: Vec<T>, key: impl Fn(&T) -> Uuid) -> HashMap<Uuid, Vec<T>> {
    let mut grouped: HashMap<Uuid, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}

fn claim_status(value: &str) -> Result<ClaimStatus, PortError> {
    ClaimStatus::from_str(value).map_err(PortError::transformation)
}

fn claim_from_rows(
    row: ClaimRow,
    notes: Vec<NoteRow>,
    history: Vec<StatusHistoryRow>,
) -> Result<Claim, PortError> {
    let status_history = history
        .into_iter()
        .map(|h| {
            Ok(StatusChange {
                status: claim_status(&h.status)?,
                changed_at: h.changed_at,
            })
        })
        .collect::<Result<Vec<_>, PortError>>()?;

    Ok(Claim {
        id: ClaimId::from_uuid(row.id),
        enrollee_no: row.enrollee_no,
        claim_reference: row.claim_reference,
        service_breakdown: ServiceBreakdown::from_value(row.service_breakdown.0),
        documents: row.documents.0,
        diagnosis: row.diagnosis,
        test_results: row.test_results.0,
        discharge_summary: row.discharge_summary,
        status: claim_status(&row.status)?,
        status_history,
        authorization_code: row.authorization_code,
        hospital_id: HospitalId::from_uuid(row.hospital_id),
        hmo_id: HmoId::from_uuid(row.hmo_id),
        pre_auth_request_id: row.pre_auth_request_id.map(PreAuthRequestId::from_uuid),
        notes: notes.into_iter().map(note_from_row).collect(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn note_from_row(row: NoteRow) -> Note {
    Note {
        id: NoteId::from_uuid(row.id),
        claim_id: ClaimId::from_uuid(row.claim_id),
        author_id: UserId::from_uuid(row.author_id),
        body: row.body,
        created_at: row.created_at,
    }
}

fn payment_from_row(row: PaymentRow) -> ClaimPayment {
    ClaimPayment {
        id: PaymentId::from_uuid(row.id),
        claim_id: ClaimId::from_uuid(row.claim_id),
        amount_expected: row.amount_expected,
        amount_paid: row.amount_paid,
        payment_date: row.payment_date,
        is_flagged: row.is_flagged,
        flag_reason: row.flag_reason,
        flagged_by: row.flagged_by.map(UserId::from_uuid),
        created_by: row.created_by,
        created_at: row.created_at,
    }
}

fn hmo_from_row(row: OrganisationRow) -> Hmo {
    Hmo {
        id: HmoId::from_uuid(row.id),
        name: row.name,
        email: row.email,
        phone_number: row.phone_number,
    }
}

fn hospital_from_row(row: OrganisationRow) -> Hospital {
    Hospital {
        id: HospitalId::from_uuid(row.id),
        name: row.name,
        email: row.email,
        phone_number: row.phone_number,
    }
}

fn authorization_from_row(row: AuthorizationRow) -> Authorization {
    Authorization {
        code: row.code,
        hmo_id: HmoId::from_uuid(row.hmo_id),
        enrollee_no: row.enrollee_no,
    }
}

fn notification_from_row(row: NotificationRow) -> Result<Notification, PortError> {
    let recipient = match row.recipient_kind.as_str() {
        "user" => NotificationRecipient::User(UserId::from_uuid(row.recipient_id)),
        "hmo" => NotificationRecipient::Hmo(HmoId::from_uuid(row.recipient_id)),
        "hospital" => NotificationRecipient::Hospital(HospitalId::from_uuid(row.recipient_id)),
        other => {
            return Err(PortError::transformation(format!(
                "unknown notification recipient kind: {other}"
            )))
        }
    };
    let status = NotificationStatus::parse(&row.status).ok_or_else(|| {
        PortError::transformation(format!("unknown notification status: {}", row.status))
    })?;

    Ok(Notification {
        id: NotificationId::from_uuid(row.id),
        title: row.title,
        message: row.message,
        status,
        recipient,
        created_at: row.created_at,
    })
}

fn health_status(
    result: Result<(), sqlx::Error>,
    latency_ms: u64,
) -> (AdapterHealth, Option<String>) {
    match result {
        Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        Ok(()) if latency_ms > DEGRADED_LATENCY_MS => (
            AdapterHealth::Degraded,
            Some(format!("SELECT 1 took {latency_ms}ms")),
        ),
        Ok(()) => (AdapterHealth::Healthy, None),
    }
}

fn outbox_from_row(row: OutboxRow) -> OutboxEvent {
    OutboxEvent {
        id: OutboxEventId::from_uuid(row.id),
        notification_id: NotificationId::from_uuid(row.notification_id),
        recipient: row.recipient,
        subject: row.subject,
        body: row.body,
        created_at: row.created_at,
        delivered_at: row.delivered_at,
        attempts: u32::try_from(row.attempts).unwrap_or_default(),
        last_error: row.last_error,
    }
}
