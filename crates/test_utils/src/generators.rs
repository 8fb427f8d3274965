//! Property-Based Test Generators
//!
//! Proptest strategies for amounts in naira and kobo, plus faker-backed
//! enrollee data.

use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::HmoId;
use domain_claims::EnrolleeData;

/// Non-negative amounts with two decimal places
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000i64).prop_map(|kobo| Decimal::new(kobo, 2))
}

/// Strictly positive amounts with two decimal places
pub fn positive_amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|kobo| Decimal::new(kobo, 2))
}

/// (paid, expected) pairs biased towards the interesting boundaries
pub fn paid_expected_strategy() -> impl Strategy<Value = (Decimal, Decimal)> {
    prop_oneof![
        amount_strategy().prop_map(|a| (a, a)),
        amount_strategy().prop_map(|e| (Decimal::ZERO, e)),
        (amount_strategy(), amount_strategy()),
    ]
}

/// Enrollee with a generated name
pub fn fake_enrollee(enrollee_no: &str, hmo_id: HmoId) -> EnrolleeData {
    EnrolleeData {
        enrollee_no: enrollee_no.to_string(),
        first_name: FirstName().fake(),
        last_name: LastName().fake(),
        hmo_id: Some(hmo_id),
    }
}
