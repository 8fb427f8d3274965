//! Notifications and the email outbox

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use core_kernel::Pagination;
use domain_claims::{Notification, NotificationRecipient, OutboxEvent};

const NOTIFICATION_COLUMNS: &str =
    "id, title, message, status, recipient_kind, recipient_id, created_at";

const OUTBOX_COLUMNS: &str =
    "id, notification_id, recipient, subject, body, created_at, delivered_at, attempts, last_error";

#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub status: String,
    pub recipient_kind: String,
    pub recipient_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OutboxRow {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

/// Splits a recipient into the `(recipient_kind, recipient_id)` column pair
pub fn recipient_columns(recipient: NotificationRecipient) -> (&'static str, Uuid) {
    match recipient {
        NotificationRecipient::User(id) => ("user", *id.as_uuid()),
        NotificationRecipient::Hmo(id) => ("hmo", *id.as_uuid()),
        NotificationRecipient::Hospital(id) => ("hospital", *id.as_uuid()),
    }
}

/// Inserts the notification and returns the identifier PostgreSQL stored
pub async fn insert_notification(
    conn: &mut PgConnection,
    notification: &Notification,
) -> Result<Uuid, sqlx::Error> {
    let (kind, recipient_id) = recipient_columns(notification.recipient);
    sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO notifications (id, title, message, status, recipient_kind, recipient_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(*notification.id.as_uuid())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.status.as_str())
    .bind(kind)
    .bind(recipient_id)
    .bind(notification.created_at)
    .fetch_one(&mut *conn)
    .await
}

pub async fn find_notification(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<NotificationRow>, sqlx::Error> {
    sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

/// A page of a hospital's notifications, newest first, with the unpaged count
pub async fn list_for_hospital(
    conn: &mut PgConnection,
    hospital_id: Uuid,
    page: Pagination,
) -> Result<(Vec<NotificationRow>, i64), sqlx::Error> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE recipient_kind = 'hospital' AND recipient_id = $1",
    )
    .bind(hospital_id)
    .fetch_one(&mut *conn)
    .await?;

    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
         WHERE recipient_kind = 'hospital' AND recipient_id = $1 \
         ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
    ))
    .bind(hospital_id)
    .bind(i64::from(page.limit()))
    .bind(page.offset() as i64)
    .fetch_all(&mut *conn)
    .await?;

    Ok((rows, total))
}

pub async fn insert_outbox_event(conn: &mut PgConnection, event: &OutboxEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notification_outbox (id, notification_id, recipient, subject, body, created_at, attempts) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(*event.id.as_uuid())
    .bind(*event.notification_id.as_uuid())
    .bind(&event.recipient)
    .bind(&event.subject)
    .bind(&event.body)
    .bind(event.created_at)
    .bind(i32::try_from(event.attempts).unwrap_or(i32::MAX))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Leases deliverable events to the caller, oldest first
///
/// The inner `FOR UPDATE SKIP LOCKED` select lets concurrent relays claim
/// disjoint batches instead of queueing on each other's row locks.
pub async fn claim_outbox_events(
    conn: &mut PgConnection,
    limit: u32,
    max_attempts: u32,
    lease_secs: f64,
) -> Result<Vec<OutboxRow>, sqlx::Error> {
    let mut rows = sqlx::query_as::<_, OutboxRow>(&format!(
        "UPDATE notification_outbox SET claimed_until = now() + make_interval(secs => $3) \
         WHERE id IN ( \
             SELECT id FROM notification_outbox \
             WHERE delivered_at IS NULL AND attempts < $1 \
               AND (claimed_until IS NULL OR claimed_until <= now()) \
             ORDER BY created_at, id LIMIT $2 \
             FOR UPDATE SKIP LOCKED) \
         RETURNING {OUTBOX_COLUMNS}"
    ))
    .bind(i64::from(max_attempts))
    .bind(i64::from(limit))
    .bind(lease_secs)
    .fetch_all(&mut *conn)
    .await?;
    rows.sort_by_key(|r| (r.created_at, r.id));
    Ok(rows)
}

pub async fn mark_outbox_delivered(
    conn: &mut PgConnection,
    id: Uuid,
    delivered_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE notification_outbox SET delivered_at = $2, claimed_until = NULL \
         WHERE id = $1 AND delivered_at IS NULL",
    )
    .bind(id)
    .bind(delivered_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Bumps the attempt counter, records the last error and drops the lease;
/// returns rows touched
pub async fn record_outbox_failure(conn: &mut PgConnection, id: Uuid, error: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE notification_outbox SET attempts = attempts + 1, last_error = $2, claimed_until = NULL \
         WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
