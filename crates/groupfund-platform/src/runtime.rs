use std::sync::Arc;

use anyhow::{Context, Result};
use groupfund_core::FundStore;
use groupfund_ledger::Ledger;
use groupfund_store::InMemoryFundStore;
use tracing::{info, warn};

use crate::config::{ServiceConfig, StoreBackend};
use crate::db::{apply_schema, connect_database};
use crate::momo::MomoClient;
use crate::notify::build_notifier;
use crate::pg_store::PgFundStore;

pub async fn build_store(config: &ServiceConfig) -> Result<Arc<dyn FundStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required")?;
            let pool = connect_database(database_url).await?;
            apply_schema(&pool).await?;
            info!("using postgres store");
            Ok(Arc::new(PgFundStore::new(pool)))
        }
        StoreBackend::Memory => {
            warn!("using in-memory store; data is lost on restart");
            Ok(Arc::new(InMemoryFundStore::new()))
        }
    }
}

/// Store, payment provider and notifier wired into one ledger.
pub async fn build_ledger(config: &ServiceConfig) -> Result<Ledger> {
    let store = build_store(config).await?;
    let payments = MomoClient::new(config.momo.clone());
    if !payments.is_configured() {
        warn!("MOMO credentials are not set; payment intents will fail");
    }
    let notifier = build_notifier(&config.notifier);
    if !notifier.is_configured() {
        warn!("notification backend is not configured; member notices are skipped");
    }

    let ledger = Ledger::new(store, notifier, Arc::new(payments), config.ledger.clone())
        .context("invalid ledger configuration")?;
    Ok(ledger)
}
