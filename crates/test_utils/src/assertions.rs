//! Custom Test Assertions
//!
//! Assertion helpers for claims results with more useful failure messages
//! than a bare `assert!(matches!(..))`.

use std::fmt::Debug;

use crate::memory::UnitOfWorkStats;
use domain_claims::{ClaimError, ErrorKind};

/// Asserts that a result failed with the given error kind
///
/// # Panics
///
/// Panics if the result is `Ok` or fails with a different kind
pub fn assert_error_kind<T: Debug>(result: &Result<T, ClaimError>, expected: ErrorKind) {
    match result {
        Ok(value) => panic!("Expected {:?} error, got Ok({:?})", expected, value),
        Err(err) => assert_eq!(
            err.kind(),
            expected,
            "Expected {:?} error, got {:?}: {}",
            expected,
            err.kind(),
            err
        ),
    }
}

/// Asserts every unit of work that was opened has also been released
pub fn assert_all_units_released(stats: &UnitOfWorkStats) {
    assert_eq!(
        stats.begun, stats.released,
        "Units of work leaked: begun={}, released={}",
        stats.begun, stats.released
    );
}
