//! Explicit application context (spec §9 "Avoiding implicit globals"): all
//! shared collaborators are constructed once and passed explicitly, rather
//! than relying on module-level singletons.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::adapters::{AdapterRegistry, PageRasterizer};
use crate::cache::RegistryCache;
use crate::config::PipelineConfig;
use crate::cost_tracker::CostTracker;
use crate::error::PipelineResult;
use crate::registry_client::RegistryClient;

/// Shared, process-wide collaborators (spec §9: "the Registry cache and
/// cost counters are the only long-lived shared state"). Constructed once
/// at start-up; the embedder owns `db_pool`'s lifetime.
pub struct PipelineContext {
    pub db_pool: PgPool,
    pub http_client: reqwest::Client,
    pub adapter_registry: Arc<AdapterRegistry>,
    pub registry_client: Arc<RegistryClient>,
    pub cost_tracker: Arc<CostTracker>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    pub async fn new(
        config: PipelineConfig,
        adapter_registry: AdapterRegistry,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> PipelineResult<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let redis_pool = deadpool_redis::Config::from_url(config.redis_url.clone())
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .ok();

        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|err| crate::error::PipelineError::internal(err.to_string()))?;

        let registry_cache = Arc::new(RegistryCache::new(
            config.registry_client.cache_max_entries,
            config.registry_client.cache_ttl_seconds,
            config.registry_client.cache_negative_ttl_seconds,
            redis_pool,
        ));
        let registry_client = Arc::new(RegistryClient::new(
            config.registry_client.base_url.clone(),
            http_client.clone(),
            registry_cache,
        ));
        let cost_tracker = Arc::new(CostTracker::new(
            config.cost_limits.max_daily_cost_usd,
            config.cost_limits.max_monthly_cost_usd,
        ));

        Ok(Self {
            db_pool,
            http_client,
            adapter_registry: Arc::new(adapter_registry),
            registry_client,
            cost_tracker,
            rasterizer,
            config,
        })
    }
}
