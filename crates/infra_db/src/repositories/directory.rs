//! Parties referenced by claims: HMOs, hospitals, authorizations, enrollees
//! and users

use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct OrganisationRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationRow {
    pub code: String,
    pub hmo_id: Uuid,
    pub enrollee_no: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct EnrolleeRow {
    pub enrollee_no: String,
    pub first_name: String,
    pub last_name: String,
    pub hmo_id: Option<Uuid>,
}

/// User joined with their hospital's email
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub hospital_id: Option<Uuid>,
    pub hospital_email: Option<String>,
    pub role: String,
}

pub async fn find_hmo(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrganisationRow>, sqlx::Error> {
    sqlx::query_as::<_, OrganisationRow>("SELECT id, name, email, phone_number FROM hmos WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn find_hospital(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrganisationRow>, sqlx::Error> {
    sqlx::query_as::<_, OrganisationRow>(
        "SELECT id, name, email, phone_number FROM hospitals WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

/// Authorization `code` as issued by `hmo_id`
pub async fn find_authorization(
    conn: &mut PgConnection,
    code: &str,
    hmo_id: Uuid,
) -> Result<Option<AuthorizationRow>, sqlx::Error> {
    sqlx::query_as::<_, AuthorizationRow>(
        "SELECT code, hmo_id, enrollee_no FROM authorizations WHERE code = $1 AND hmo_id = $2",
    )
    .bind(code)
    .bind(hmo_id)
    .fetch_optional(&mut *conn)
    .await
}

/// An active enrollee by number
pub async fn find_active_enrollee(
    conn: &mut PgConnection,
    enrollee_no: &str,
) -> Result<Option<EnrolleeRow>, sqlx::Error> {
    sqlx::query_as::<_, EnrolleeRow>(
        "SELECT enrollee_no, first_name, last_name, hmo_id FROM enrollees \
         WHERE enrollee_no = $1 AND is_active",
    )
    .bind(enrollee_no)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn find_user(conn: &mut PgConnection, id: Uuid) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        "SELECT u.id, u.first_name, u.last_name, u.email, u.hospital_id, \
                h.email AS hospital_email, u.role \
         FROM users u LEFT JOIN hospitals h ON h.id = u.hospital_id \
         WHERE u.id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}
