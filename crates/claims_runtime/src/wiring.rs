//! Claims services wired over PostgreSQL

use std::sync::Arc;

use tracing::info;

use domain_claims::{
    ClaimLifecycleManager, ClaimStore, Mailer, NotificationDispatcher, OutboxRelay,
    PaymentReconciliationEngine,
};
use infra_db::{
    create_pool, run_migrations, DatabaseError, DatabasePool, PgEligibilityResolver,
    PgIdentityResolver, PostgresClaimStore,
};

use crate::config::RuntimeConfig;

/// Every claims service sharing one pool and one outbox relay
#[derive(Clone)]
pub struct ClaimsServices {
    pub pool: DatabasePool,
    pub store: Arc<PostgresClaimStore>,
    pub lifecycle: ClaimLifecycleManager,
    pub reconciliation: PaymentReconciliationEngine,
    pub notifications: NotificationDispatcher,
    pub relay: OutboxRelay,
}

impl ClaimsServices {
    /// Opens the pool, applies pending migrations and builds the services
    pub async fn connect(config: &RuntimeConfig, mailer: Arc<dyn Mailer>) -> Result<Self, DatabaseError> {
        let pool = create_pool(config.database()).await?;
        run_migrations(&pool).await?;
        info!(max_connections = config.max_connections, "claims database ready");
        Ok(Self::from_pool(pool, config, mailer))
    }

    pub fn from_pool(pool: DatabasePool, config: &RuntimeConfig, mailer: Arc<dyn Mailer>) -> Self {
        let store = Arc::new(PostgresClaimStore::new(pool.clone()));
        let relay = relay_for(store.clone(), mailer, config);

        Self {
            lifecycle: ClaimLifecycleManager::new(
                store.clone(),
                Arc::new(PgEligibilityResolver::new(pool.clone())),
                relay.clone(),
            ),
            reconciliation: PaymentReconciliationEngine::new(
                store.clone(),
                Arc::new(PgIdentityResolver::new(pool.clone())),
                relay.clone(),
            ),
            notifications: NotificationDispatcher::new(store.clone()),
            relay,
            store,
            pool,
        }
    }
}

/// An outbox relay sized from configuration
pub fn relay_for(store: Arc<dyn ClaimStore>, mailer: Arc<dyn Mailer>, config: &RuntimeConfig) -> OutboxRelay {
    OutboxRelay::new(store, mailer)
        .with_batch_size(config.outbox_batch_size)
        .with_max_attempts(config.outbox_max_attempts)
        .with_claim_lease(config.claim_lease())
}
