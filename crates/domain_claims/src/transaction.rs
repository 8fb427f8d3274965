//! Transaction Orchestrator
//!
//! Runs a piece of work inside one unit of work. The work either commits as
//! a whole or is rolled back, and the unit of work is dropped exactly once on
//! every path out of [`TransactionOrchestrator::with_transaction`]. A unit of
//! work dropped mid-flight (panic, cancelled future) releases its resource in
//! its own `Drop`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::ClaimError;
use crate::ports::{ClaimStore, UnitOfWork};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone)]
pub struct TransactionOrchestrator {
    store: Arc<dyn ClaimStore>,
}

impl TransactionOrchestrator {
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self { store }
    }

    /// Runs `work` in a fresh unit of work, committing on `Ok`
    ///
    /// On `Err` the unit of work is rolled back and the error returned
    /// unchanged. A failed commit is reported as `CommitFailed`. Nothing is
    /// retried.
    pub async fn with_transaction<T, F>(&self, operation: &'static str, work: F) -> Result<T, ClaimError>
    where
        T: Send,
        F: for<'u> FnOnce(&'u mut dyn UnitOfWork) -> BoxFuture<'u, Result<T, ClaimError>> + Send,
    {
        let mut uow = self.store.begin().await?;

        match work(uow.as_mut()).await {
            Ok(value) => match uow.commit().await {
                Ok(()) => {
                    info!(operation, "unit of work committed");
                    Ok(value)
                }
                Err(e) => {
                    error!(operation, error = %e, "commit failed");
                    if let Err(rollback_err) = uow.rollback().await {
                        warn!(operation, error = %rollback_err, "rollback after failed commit also failed");
                    }
                    Err(ClaimError::CommitFailed(e))
                }
            },
            Err(err) => {
                warn!(operation, error = %err, "rolling back unit of work");
                if let Err(rollback_err) = uow.rollback().await {
                    error!(operation, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
