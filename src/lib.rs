pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

use crate::application::adapter_registry::{RetailerRegistry, RouteInfo};
use crate::application::orchestrator::{
    AggregationReport, CheckRunReport, CycleReport, OrchestratorConfig, TaskOrchestrator,
};
use crate::application::pricing_engine::PricingEngine;
use crate::application::proxy_pool::{ProxyPool, ProxyStatus};
use crate::application::strategies::lowest_latest::LowestLatestStrategy;
use crate::application::task_board::TaskBoard;
use crate::config::PipelineConfig;
use crate::domain::entities::monitored_product::{MonitoredProduct, MonitoredRow};
use crate::domain::entities::price_group::PriceGroup;
use crate::domain::error::DomainError;
use crate::domain::ports::pricing_strategy::PricingStrategy;
use crate::domain::ports::sample_store::{HistoryFilter, NewMonitored, SampleStore};
use crate::domain::ports::storefront::StorefrontPublisher;
use crate::domain::values::ids::{RegionId, RetailerId, VariantId};
use crate::infrastructure::retailers::default_registry;
use crate::infrastructure::sqlite::sample_store::SqliteSampleStore;
use crate::infrastructure::storefront::http::HttpPublisher;
use crate::infrastructure::storefront::log::LogPublisher;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub struct PriceWatch {
    orchestrator: TaskOrchestrator,
}

impl PriceWatch {
    pub fn new(config: &PipelineConfig) -> Result<Self, DomainError> {
        let store: Arc<dyn SampleStore> = Arc::new(SqliteSampleStore::open(&config.db_path)?);
        let publisher: Arc<dyn StorefrontPublisher> = match &config.storefront_url {
            Some(url) => Arc::new(HttpPublisher::new(
                url.clone(),
                config.storefront_token.clone(),
                config.orchestrator.request_timeout,
            )),
            None => Arc::new(LogPublisher),
        };
        if config.proxies.is_empty() {
            warn!("no proxies configured (PRICEWATCH_PROXIES); every check will fail with an exhausted pool");
        }
        info!(
            proxies = config.proxies.len(),
            history_window = %config.orchestrator.history_window,
            publisher = publisher.name(),
            "pipeline configured"
        );

        Ok(Self::with_collaborators(
            store,
            ProxyPool::new(config.proxies.clone(), config.proxy_pool),
            default_registry(&config.retailer_hosts)?,
            Arc::new(LowestLatestStrategy),
            publisher,
            config.orchestrator.clone(),
        ))
    }

    pub fn with_collaborators(
        store: Arc<dyn SampleStore>,
        pool: ProxyPool,
        registry: RetailerRegistry,
        strategy: Arc<dyn PricingStrategy>,
        publisher: Arc<dyn StorefrontPublisher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            orchestrator: TaskOrchestrator::new(
                store,
                Arc::new(pool),
                Arc::new(registry),
                PricingEngine::new(strategy, publisher),
                config,
            ),
        }
    }

    // Pipeline stages
    pub async fn run_checks(&self) -> Result<CheckRunReport, DomainError> {
        self.orchestrator.run_checks().await
    }

    pub async fn run_aggregation(&self) -> Result<AggregationReport, DomainError> {
        self.orchestrator.run_aggregation().await
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, DomainError> {
        self.orchestrator.run_cycle().await
    }

    /// Runs a full cycle every `every` until `shutdown` resolves. A failed
    /// cycle is logged and retried from scratch on the next tick.
    pub async fn serve<F>(&self, every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        info!(every_secs = every.as_secs(), "scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(report) => info!(
                            succeeded = report.checks.succeeded,
                            failed = report.checks.failed,
                            published = report.aggregation.published,
                            "cycle complete"
                        ),
                        Err(e) => error!("cycle aborted: {e}"),
                    }
                }
            }
        }
    }

    pub fn task_board(&self) -> Arc<TaskBoard> {
        self.orchestrator.task_board()
    }

    // Catalog
    /// Starts monitoring a retailer page. The retailer tag is resolved from
    /// the URL host here, once, unless given explicitly.
    pub fn add_monitored(
        &self,
        url: &str,
        variant_id: &str,
        region_id: &str,
        retailer: Option<&str>,
    ) -> Result<MonitoredProduct, DomainError> {
        let url = url.trim();
        let parsed = url::Url::parse(url)
            .map_err(|e| DomainError::InvalidInput(format!("Invalid URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DomainError::InvalidInput(format!("URL must be http(s): {url}")));
        }

        let registry = self.orchestrator.registry();
        let retailer_id = match retailer {
            Some(tag) => RetailerId::tag(tag)?,
            None => registry
                .identify(url)
                .map_err(|e| DomainError::InvalidInput(e.to_string()))?,
        };
        registry
            .resolve(&retailer_id)
            .map_err(|e| DomainError::InvalidInput(e.to_string()))?;

        let new = NewMonitored {
            url: url.to_string(),
            variant_id: VariantId::parse(variant_id)?,
            retailer_id,
            region_id: RegionId::parse(region_id)?,
        };
        let id = self.orchestrator.store().add_monitored(&new)?;
        info!(id, url, retailer_id = %new.retailer_id, "monitoring product");
        Ok(MonitoredProduct {
            id,
            url: new.url,
            variant_id: new.variant_id,
            retailer_id: Some(new.retailer_id),
            region_id: new.region_id,
        })
    }

    pub fn list_monitored(&self) -> Result<Vec<MonitoredRow>, DomainError> {
        self.orchestrator.store().list_monitored_products()
    }

    pub fn remove_monitored(&self, id: i64) -> Result<(), DomainError> {
        self.orchestrator.store().remove_monitored(id)
    }

    // History & status
    pub fn history(&self, filter: &HistoryFilter) -> Result<Vec<PriceGroup>, DomainError> {
        self.orchestrator.store().grouped_price_history(filter)
    }

    /// Streams history groups to `visit` without materializing the whole set.
    pub fn visit_history(
        &self,
        filter: &HistoryFilter,
        visit: &mut dyn FnMut(PriceGroup) -> Result<(), DomainError>,
    ) -> Result<usize, DomainError> {
        self.orchestrator.store().visit_price_history(filter, visit)
    }

    pub fn sample_count(&self) -> Result<usize, DomainError> {
        self.orchestrator.store().sample_count()
    }

    pub fn proxies(&self) -> Vec<ProxyStatus> {
        self.orchestrator.pool().snapshot()
    }

    pub fn retailers(&self) -> Vec<RouteInfo> {
        self.orchestrator.registry().routes()
    }

    pub fn history_window(&self) -> crate::domain::values::history_window::HistoryWindow {
        self.orchestrator.config().history_window
    }
}
