//! Caller identity and the response envelope

use serde::{Deserialize, Serialize};

use core_kernel::{HospitalId, UserId};

/// The authenticated hospital user on whose behalf an operation runs
///
/// Verified by the caller's identity layer before the core is invoked;
/// the services trust it as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub hospital_id: HospitalId,
    pub first_name: String,
    pub last_name: String,
}

impl Actor {
    pub fn new(
        user_id: UserId,
        hospital_id: HospitalId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            hospital_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Successful operation result
///
/// Failures are returned as `ClaimError`, so `status` is always true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    pub message: String,
    pub status: bool,
    pub data: T,
}

impl<T> ServiceResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            status: true,
            data,
        }
    }
}
