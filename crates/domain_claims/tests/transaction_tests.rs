//! Unit-of-work lifecycle tests for the transaction orchestrator

use std::time::Duration;

use domain_claims::{ClaimError, TransactionOrchestrator};
use test_utils::{assert_all_units_released, ClaimsHarness};

#[tokio::test]
async fn test_successful_work_commits_once() {
    let h = ClaimsHarness::new().await;
    let orchestrator = TransactionOrchestrator::new(h.store.clone());

    let value = orchestrator
        .with_transaction("answer", |_uow| Box::pin(async move { Ok::<_, ClaimError>(42) }))
        .await
        .unwrap();

    assert_eq!(value, 42);
    let stats = h.store.stats();
    assert_eq!((stats.begun, stats.committed, stats.rolled_back), (1, 1, 0));
    assert_all_units_released(&stats);
}

#[tokio::test]
async fn test_failed_work_rolls_back_and_returns_original_error() {
    let h = ClaimsHarness::new().await;
    let orchestrator = TransactionOrchestrator::new(h.store.clone());

    let result = orchestrator
        .with_transaction::<(), _>("refuse", |_uow| {
            Box::pin(async move { Err(ClaimError::PaymentAlreadyMatched) })
        })
        .await;

    assert!(matches!(result, Err(ClaimError::PaymentAlreadyMatched)));
    let stats = h.store.stats();
    assert_eq!((stats.committed, stats.rolled_back), (0, 1));
    assert_all_units_released(&stats);
}

#[tokio::test]
async fn test_cancelled_work_releases_unit_of_work() {
    let h = ClaimsHarness::new().await;
    let orchestrator = TransactionOrchestrator::new(h.store.clone());

    let slow = orchestrator.with_transaction("slow", |_uow| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ClaimError>(())
        })
    });
    let outcome = tokio::time::timeout(Duration::from_millis(20), slow).await;

    assert!(outcome.is_err());
    let stats = h.store.stats();
    assert_eq!(stats.begun, 1);
    assert_eq!(stats.committed, 0);
    assert_all_units_released(&stats);
}

#[tokio::test]
async fn test_panicking_work_releases_unit_of_work() {
    let h = ClaimsHarness::new().await;
    let orchestrator = TransactionOrchestrator::new(h.store.clone());

    let handle = tokio::spawn(async move {
        orchestrator
            .with_transaction::<(), _>("panics", |_uow| {
                Box::pin(async move {
                    if work_fails() {
                        panic!("work panicked");
                    }
                    Ok(())
                })
            })
            .await
    });

    let joined = handle.await;
    assert!(joined.is_err_and(|e| e.is_panic()));
    assert_all_units_released(&h.store.stats());
}

fn work_fails() -> bool {
    true
}
