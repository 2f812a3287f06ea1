use std::sync::Arc;

use tracing::info;

use stockledger_infra::LedgerResult;
use stockledger_infra::cache::{InMemoryViewCache, ViewCache};
use stockledger_infra::config::AppConfig;
use stockledger_infra::services::LedgerService;
use stockledger_infra::settlement::SettlementOrchestrator;
use stockledger_infra::store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};
use stockledger_infra::views::DerivedViews;

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub ledger: LedgerService,
    pub settlement: SettlementOrchestrator,
    pub views: Arc<DerivedViews>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn ViewCache>,
        config: &AppConfig,
    ) -> LedgerResult<Self> {
        let policy = config
            .transition_policy()
            .map_err(|e| stockledger_infra::LedgerError::validation(e.to_string()))?;
        let views = Arc::new(DerivedViews::new(store.clone(), cache, config.cache_ttls()));
        Ok(Self {
            ledger: LedgerService::new(store.clone(), views.clone(), policy),
            settlement: SettlementOrchestrator::new(store, views.clone()),
            views,
        })
    }

    /// In-memory store and cache (dev/test).
    pub fn in_memory(config: &AppConfig) -> LedgerResult<Self> {
        Self::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryViewCache::new()),
            config,
        )
    }
}

async fn build_store(config: &AppConfig) -> LedgerResult<Arc<dyn LedgerStore>> {
    match config.database_url() {
        Some(url) => {
            let store =
                PostgresLedgerStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            info!("using postgres ledger store");
            Ok(Arc::new(store))
        }
        None => {
            info!("using in-memory ledger store");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}

#[cfg(feature = "redis")]
fn build_cache(config: &AppConfig) -> LedgerResult<Arc<dyn ViewCache>> {
    use stockledger_infra::cache::RedisViewCache;

    match config.redis_url() {
        Some(url) => {
            let cache = RedisViewCache::new(url, config.redis_namespace.clone())
                .map_err(|e| stockledger_infra::LedgerError::internal(e.to_string()))?;
            info!("using redis view cache");
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(InMemoryViewCache::new())),
    }
}

#[cfg(not(feature = "redis"))]
fn build_cache(config: &AppConfig) -> LedgerResult<Arc<dyn ViewCache>> {
    if config.redis_url().is_some() {
        tracing::warn!("redis url configured but redis feature not enabled, falling back to in-memory cache");
    }
    Ok(Arc::new(InMemoryViewCache::new()))
}

pub async fn build_services(config: &AppConfig) -> LedgerResult<AppServices> {
    let store = build_store(config).await?;
    let cache = build_cache(config)?;
    AppServices::new(store, cache, config)
}
