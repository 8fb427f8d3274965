//! PostgreSQL directory adapters
//!
//! Enrollee eligibility and user lookups read the `enrollees` and `users`
//! tables. Deployments that resolve these against an external registry swap
//! these adapters out without touching the claims services.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use core_kernel::{DomainPort, HmoId, HospitalId, PortError, UserId};
use domain_claims::{
    EligibilityResolver, EligibilityResult, EnrolleeData, IdentityResolver, Role, User,
};

use crate::error::{acquire_error, port_error};
use crate::repositories::directory::{self as directory_sql, EnrolleeRow, UserRow};

/// Eligibility from the local `enrollees` table; only active enrollees count
#[derive(Debug, Clone)]
pub struct PgEligibilityResolver {
    pool: PgPool,
}

impl PgEligibilityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgEligibilityResolver {}

#[async_trait]
impl EligibilityResolver for PgEligibilityResolver {
    async fn check_eligibility(&self, enrollee_no: &str) -> Result<EligibilityResult, PortError> {
        let started = Instant::now();
        let mut conn = self.pool.acquire().await.map_err(|e| acquire_error(e, started))?;
        let row = directory_sql::find_active_enrollee(&mut conn, enrollee_no)
            .await
            .map_err(port_error)?;
        debug!(enrollee_no, found = row.is_some(), "eligibility checked");
        Ok(row
            .map(|r| EligibilityResult::eligible(enrollee_from_row(r)))
            .unwrap_or_else(EligibilityResult::not_found))
    }
}

#[derive(Debug, Clone)]
pub struct PgIdentityResolver {
    pool: PgPool,
}

impl PgIdentityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PgIdentityResolver {}

#[async_trait]
impl IdentityResolver for PgIdentityResolver {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, PortError> {
        let started = Instant::now();
        let mut conn = self.pool.acquire().await.map_err(|e| acquire_error(e, started))?;
        directory_sql::find_user(&mut conn, *id.as_uuid())
            .await
            .map_err(port_error)?
            .map(user_from_row)
            .transpose()
    }

    async fn find_user_by_role(&self, id: UserId, role: Role) -> Result<Option<User>, PortError> {
        Ok(self.find_user(id).await?.filter(|user| user.role == role))
    }
}

fn enrollee_from_row(row: EnrolleeRow) -> EnrolleeData {
    EnrolleeData {
        enrollee_no: row.enrollee_no,
        first_name: row.first_name,
        last_name: row.last_name,
        hmo_id: row.hmo_id.map(HmoId::from_uuid),
    }
}

fn user_from_row(row: UserRow) -> Result<User, PortError> {
    let role = Role::parse(&row.role)
        .ok_or_else(|| PortError::transformation(format!("unknown user role: {}", row.role)))?;
    Ok(User {
        id: UserId::from_uuid(row.id),
        first_name: row.first_name,
        last_name: row.last_name,
        email: row.email,
        hospital_id: row.hospital_id.map(HospitalId::from_uuid),
        hospital_email: row.hospital_email,
        role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user_row(role: &str) -> UserRow {
        UserRow {
            id: Uuid::now_v7(),
            first_name: "Ada".to_string(),
            last_name: "Obi".to_string(),
            email: "ada@example.com".to_string(),
            hospital_id: Some(Uuid::now_v7()),
            hospital_email: Some("records@lagoon.example".to_string()),
            role: role.to_string(),
        }
    }

    #[test]
    fn test_user_row_maps_role() {
        let user = user_from_row(user_row("review_admin")).unwrap();
        assert_eq!(user.role, Role::ReviewAdmin);
        assert_eq!(user.full_name(), "Ada Obi");
        assert_eq!(user.hospital_email.as_deref(), Some("records@lagoon.example"));
    }

    #[test]
    fn test_admin_roles_map_from_stored_rows() {
        assert_eq!(user_from_row(user_row("hospital_admin")).unwrap().role, Role::HospitalAdmin);
        let hmo_admin = UserRow {
            hospital_id: None,
            hospital_email: None,
            ..user_row("hmo_admin")
        };
        assert_eq!(user_from_row(hmo_admin).unwrap().role, Role::HmoAdmin);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!(matches!(
            user_from_row(user_row("superuser")),
            Err(PortError::Transformation { .. })
        ));
    }

    #[test]
    fn test_enrollee_without_hmo() {
        let data = enrollee_from_row(EnrolleeRow {
            enrollee_no: "ENR-0001".to_string(),
            first_name: "Chidi".to_string(),
            last_name: "Okeke".to_string(),
            hmo_id: None,
        });
        assert_eq!(data.full_name(), "Chidi Okeke");
        assert!(data.hmo_id.is_none());
    }
}
