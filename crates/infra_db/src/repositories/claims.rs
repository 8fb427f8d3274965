//! Provider claims repository
//!
//! SQL for claims, their notes and status history, and claim payments.
//! Every function runs on a borrowed connection so the same statement serves
//! pooled reads and reads inside an open transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use domain_claims::ports::{ClaimQuery, PaymentQuery};
use domain_claims::{Claim, ClaimPayment, Note};

const CLAIM_COLUMNS: &str = "c.id, c.claim_reference, c.enrollee_no, c.hmo_id, c.hospital_id, \
    c.status, c.service_breakdown, c.documents, c.diagnosis, c.test_results, \
    c.discharge_summary, c.authorization_code, c.pre_auth_request_id, c.created_at, c.updated_at";

const PAYMENT_COLUMNS: &str = "p.id, p.claim_id, p.amount_expected, p.amount_paid, \
    p.payment_date, p.is_flagged, p.flag_reason, p.flagged_by, p.created_by, p.created_at";

/// Database row for `provider_claims`
#[derive(Debug, Clone, FromRow)]
pub struct ClaimRow {
    pub id: Uuid,
    pub claim_reference: String,
    pub enrollee_no: String,
    pub hmo_id: Uuid,
    pub hospital_id: Uuid,
    pub status: String,
    pub service_breakdown: Json<Value>,
    pub documents: Json<Value>,
    pub diagnosis: Option<String>,
    pub test_results: Json<Value>,
    pub discharge_summary: Option<String>,
    pub authorization_code: Option<String>,
    pub pre_auth_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Claim row joined with its HMO's name
#[derive(Debug, Clone, FromRow)]
pub struct ClaimListingRow {
    #[sqlx(flatten)]
    pub claim: ClaimRow,
    pub hmo_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct NoteRow {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StatusHistoryRow {
    pub claim_id: Uuid,
    pub status: String,
    pub changed_at: DateTime<Utc>,
}

/// Database row for `claim_payments`
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub amount_expected: Decimal,
    pub amount_paid: Decimal,
    pub payment_date: NaiveDate,
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    pub flagged_by: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentListingRow {
    #[sqlx(flatten)]
    pub payment: PaymentRow,
    pub hmo_name: String,
}

pub async fn find_claim(conn: &mut PgConnection, id: Uuid) -> Result<Option<ClaimRow>, sqlx::Error> {
    sqlx::query_as::<_, ClaimRow>(&format!(
        "SELECT {CLAIM_COLUMNS} FROM provider_claims c WHERE c.id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

/// Claims matching the query joined with HMO names, newest first
pub async fn list_claims(
    conn: &mut PgConnection,
    query: &ClaimQuery,
) -> Result<Vec<ClaimListingRow>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {CLAIM_COLUMNS}, h.name AS hmo_name \
         FROM provider_claims c JOIN hmos h ON h.id = c.hmo_id \
         WHERE c.hospital_id = "
    ));
    builder.push_bind(*query.hospital_id.as_uuid());

    if let Some(hmo_id) = query.hmo_id {
        builder.push(" AND c.hmo_id = ").push_bind(*hmo_id.as_uuid());
    }
    if let Some(enrollee_no) = &query.enrollee_no {
        builder.push(" AND c.enrollee_no = ").push_bind(enrollee_no.clone());
    }
    if let Some(date) = query.date {
        builder
            .push(" AND (c.created_at AT TIME ZONE 'UTC')::date = ")
            .push_bind(date);
    }
    builder.push(" ORDER BY c.created_at DESC, c.id DESC");

    let rows = builder
        .build_query_as::<ClaimListingRow>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

/// Notes for the given claims, oldest first
pub async fn notes_for(conn: &mut PgConnection, claim_ids: &[Uuid]) -> Result<Vec<NoteRow>, sqlx::Error> {
    sqlx::query_as::<_, NoteRow>(
        "SELECT id, claim_id, author_id, body, created_at FROM claim_notes \
         WHERE claim_id = ANY($1) ORDER BY created_at, id",
    )
    .bind(claim_ids)
    .fetch_all(&mut *conn)
    .await
}

pub async fn status_history_for(
    conn: &mut PgConnection,
    claim_ids: &[Uuid],
) -> Result<Vec<StatusHistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, StatusHistoryRow>(
        "SELECT claim_id, status, changed_at FROM claim_status_history \
         WHERE claim_id = ANY($1) ORDER BY changed_at, id",
    )
    .bind(claim_ids)
    .fetch_all(&mut *conn)
    .await
}

pub async fn claim_reference_exists(conn: &mut PgConnection, reference: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM provider_claims WHERE claim_reference = $1)",
    )
    .bind(reference)
    .fetch_one(&mut *conn)
    .await
}

/// Inserts the claim row; a duplicate reference fails with SQLSTATE 23505
pub async fn insert_claim(conn: &mut PgConnection, claim: &Claim) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO provider_claims (
            id, claim_reference, enrollee_no, hmo_id, hospital_id, status,
            service_breakdown, documents, diagnosis, test_results, discharge_summary,
            authorization_code, pre_auth_request_id, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(*claim.id.as_uuid())
    .bind(&claim.claim_reference)
    .bind(&claim.enrollee_no)
    .bind(*claim.hmo_id.as_uuid())
    .bind(*claim.hospital_id.as_uuid())
    .bind(claim.status.as_str())
    .bind(Json(claim.service_breakdown.as_value()))
    .bind(Json(&claim.documents))
    .bind(&claim.diagnosis)
    .bind(Json(&claim.test_results))
    .bind(&claim.discharge_summary)
    .bind(&claim.authorization_code)
    .bind(claim.pre_auth_request_id.map(|id| *id.as_uuid()))
    .bind(claim.created_at)
    .bind(claim.updated_at)
    .execute(&mut *conn)
    .await?;

    sync_status_history(conn, claim).await
}

/// Writes the mutable claim fields; owner, HMO and enrollee are never changed
pub async fn update_claim(conn: &mut PgConnection, claim: &Claim) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE provider_claims SET
            status = $2, service_breakdown = $3, documents = $4, diagnosis = $5,
            test_results = $6, discharge_summary = $7, authorization_code = $8,
            updated_at = $9
         WHERE id = $1",
    )
    .bind(*claim.id.as_uuid())
    .bind(claim.status.as_str())
    .bind(Json(claim.service_breakdown.as_value()))
    .bind(Json(&claim.documents))
    .bind(&claim.diagnosis)
    .bind(Json(&claim.test_results))
    .bind(&claim.discharge_summary)
    .bind(&claim.authorization_code)
    .bind(claim.updated_at)
    .execute(&mut *conn)
    .await?;

    sync_status_history(conn, claim).await?;
    Ok(result.rows_affected())
}

// History rows are append-only; entries already stored are skipped
async fn sync_status_history(conn: &mut PgConnection, claim: &Claim) -> Result<(), sqlx::Error> {
    for change in &claim.status_history {
        sqlx::query(
            "INSERT INTO claim_status_history (claim_id, status, changed_at) VALUES ($1, $2, $3) \
             ON CONFLICT (claim_id, status, changed_at) DO NOTHING",
        )
        .bind(*claim.id.as_uuid())
        .bind(change.status.as_str())
        .bind(change.changed_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn insert_note(conn: &mut PgConnection, note: &Note) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO claim_notes (id, claim_id, author_id, body, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(*note.id.as_uuid())
    .bind(*note.claim_id.as_uuid())
    .bind(*note.author_id.as_uuid())
    .bind(&note.body)
    .bind(note.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// The most recently recorded payment for a claim
pub async fn current_payment(conn: &mut PgConnection, claim_id: Uuid) -> Result<Option<PaymentRow>, sqlx::Error> {
    sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM claim_payments p WHERE p.claim_id = $1 \
         ORDER BY p.created_at DESC, p.id DESC LIMIT 1"
    ))
    .bind(claim_id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn insert_payment(conn: &mut PgConnection, payment: &ClaimPayment) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO claim_payments (
            id, claim_id, amount_expected, amount_paid, payment_date,
            is_flagged, flag_reason, flagged_by, created_by, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(*payment.id.as_uuid())
    .bind(*payment.claim_id.as_uuid())
    .bind(payment.amount_expected)
    .bind(payment.amount_paid)
    .bind(payment.payment_date)
    .bind(payment.is_flagged)
    .bind(&payment.flag_reason)
    .bind(payment.flagged_by.map(|id| *id.as_uuid()))
    .bind(&payment.created_by)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_payment(conn: &mut PgConnection, payment: &ClaimPayment) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE claim_payments SET
            amount_expected = $2, amount_paid = $3, is_flagged = $4,
            flag_reason = $5, flagged_by = $6
         WHERE id = $1",
    )
    .bind(*payment.id.as_uuid())
    .bind(payment.amount_expected)
    .bind(payment.amount_paid)
    .bind(payment.is_flagged)
    .bind(&payment.flag_reason)
    .bind(payment.flagged_by.map(|id| *id.as_uuid()))
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Payments on the hospital's claims, ordered by payment date then creation
///
/// The status filter is evaluated in SQL with the same predicate the domain
/// uses to derive the status.
pub async fn list_payments(
    conn: &mut PgConnection,
    query: &PaymentQuery,
) -> Result<Vec<PaymentListingRow>, sqlx::Error> {
    let filter = &query.filter;
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {PAYMENT_COLUMNS}, h.name AS hmo_name \
         FROM claim_payments p \
         JOIN provider_claims c ON c.id = p.claim_id \
         JOIN hmos h ON h.id = c.hmo_id \
         WHERE c.hospital_id = "
    ));
    builder.push_bind(*query.hospital_id.as_uuid());

    if let Some(hmo_name) = &filter.hmo_name {
        builder.push(" AND h.name = ").push_bind(hmo_name.clone());
    }
    if let Some(start) = filter.payment_dates.start {
        builder.push(" AND p.payment_date >= ").push_bind(start);
    }
    if let Some(end) = filter.payment_dates.end {
        builder.push(" AND p.payment_date <= ").push_bind(end);
    }
    if let Some(status) = filter.status {
        builder
            .push(" AND ")
            .push(status.predicate().sql("p.amount_paid", "p.amount_expected"));
    }
    builder.push(" ORDER BY p.payment_date, p.created_at, p.id");

    if let Some(page) = query.page {
        builder
            .push(" LIMIT ")
            .push_bind(i64::from(page.limit()))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
    }

    let rows = builder
        .build_query_as::<PaymentListingRow>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}
