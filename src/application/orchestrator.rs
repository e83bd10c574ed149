//! Two-stage monitoring pipeline.
//!
//! Stage one fans out one check-task per monitored product: each task leases
//! a proxy, asks the retailer's adapter for the current price and appends a
//! sample. A [`CompletionBarrier`] counts tasks down to their terminal
//! state; once it opens, stage two groups the accumulated samples per
//! (variant, region) and prices every group through the [`PricingEngine`].
//!
//! Failed tasks do not hold back stage two. They only contribute no sample.

use crate::application::adapter_registry::RetailerRegistry;
use crate::application::barrier::CompletionBarrier;
use crate::application::pricing_engine::{GroupOutcome, PricingEngine};
use crate::application::proxy_pool::{ProxyOutcome, ProxyPool};
use crate::application::task_board::TaskBoard;
use crate::domain::entities::check_task::{CheckTask, TaskFailure};
use crate::domain::entities::monitored_product::{MalformedProduct, MonitoredProduct};
use crate::domain::entities::price_sample::PriceSample;
use crate::domain::error::DomainError;
use crate::domain::ports::sample_store::{HistoryFilter, SampleStore};
use crate::domain::values::history_window::HistoryWindow;
use crate::domain::values::task_state::{FailureStage, TaskState};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Check-tasks running at once.
    pub concurrency: usize,
    /// Total attempts per task, first one included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub request_timeout: Duration,
    pub history_window: HistoryWindow,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            request_timeout: Duration::from_secs(20),
            history_window: HistoryWindow::All,
        }
    }
}

impl OrchestratorConfig {
    /// Delay before re-dispatching after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_cap)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub product_id: i64,
    pub url: String,
    pub variant_id: String,
    pub retailer_id: Option<String>,
    pub region_id: String,
    pub state: TaskState,
    pub attempts: u32,
    pub price: Option<Decimal>,
    pub failure: Option<TaskFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckRunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Monitored rows left out of the batch because they were malformed.
    pub excluded: Vec<MalformedProduct>,
    pub results: Vec<TaskReport>,
}

impl CheckRunReport {
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.results
            .iter()
            .filter(|r| r.state == TaskState::FailedPermanently)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub run_id: String,
    pub window: HistoryWindow,
    pub strategy: String,
    pub groups: usize,
    pub published: usize,
    pub failed: usize,
    pub outcomes: Vec<GroupOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub checks: CheckRunReport,
    pub aggregation: AggregationReport,
}

/// Shared by every task of one check run.
struct RunContext {
    store: Arc<dyn SampleStore>,
    pool: Arc<ProxyPool>,
    registry: Arc<RetailerRegistry>,
    board: Arc<TaskBoard>,
    barrier: Arc<CompletionBarrier>,
    workers: Arc<Semaphore>,
    config: OrchestratorConfig,
}

/// Counts its task as arrived at the barrier when dropped, so a panicking
/// or aborted task cannot hold the barrier shut. A task dropped before
/// reaching a terminal state is failed on the board first.
struct Arrival {
    barrier: Arc<CompletionBarrier>,
    board: Arc<TaskBoard>,
    task_id: String,
}

impl Drop for Arrival {
    fn drop(&mut self) {
        self.board
            .abandon(&self.task_id, "check task panicked or was aborted");
        self.barrier.arrive();
    }
}

struct AttemptError {
    stage: FailureStage,
    cause: String,
    transient: bool,
}

impl AttemptError {
    fn transient(stage: FailureStage, cause: impl ToString) -> Self {
        Self {
            stage,
            cause: cause.to_string(),
            transient: true,
        }
    }

    fn permanent(stage: FailureStage, cause: impl ToString) -> Self {
        Self {
            stage,
            cause: cause.to_string(),
            transient: false,
        }
    }
}

/// Owns the pipeline's collaborators for its lifetime and runs both stages.
pub struct TaskOrchestrator {
    store: Arc<dyn SampleStore>,
    pool: Arc<ProxyPool>,
    registry: Arc<RetailerRegistry>,
    engine: PricingEngine,
    config: OrchestratorConfig,
    check_lock: tokio::sync::Mutex<()>,
    board: Mutex<Arc<TaskBoard>>,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<dyn SampleStore>,
        pool: Arc<ProxyPool>,
        registry: Arc<RetailerRegistry>,
        engine: PricingEngine,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            pool,
            registry,
            engine,
            config,
            check_lock: tokio::sync::Mutex::new(()),
            board: Mutex::new(Arc::new(TaskBoard::default())),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    pub fn registry(&self) -> &RetailerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.store
    }

    /// Task board of the current (or most recent) check run.
    pub fn task_board(&self) -> Arc<TaskBoard> {
        self.board.lock().clone()
    }

    /// Stage one: check every monitored product once.
    ///
    /// Returns after every task is terminal. Fails only when the monitored
    /// set cannot be read; overlapping calls run one after the other.
    pub async fn run_checks(&self) -> Result<CheckRunReport, DomainError> {
        let _running = self.check_lock.lock().await;
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("check_run", %run_id);
        self.run_checks_inner(run_id).instrument(span).await
    }

    async fn run_checks_inner(&self, run_id: String) -> Result<CheckRunReport, DomainError> {
        let started_at = Utc::now();
        let rows = self.store.list_monitored_products().map_err(|e| {
            error!(stage = "list_monitored", "check run aborted: {e}");
            e
        })?;

        let (products, excluded) = self.ingest(rows);
        let board = Arc::new(TaskBoard::new(run_id.clone()));
        *self.board.lock() = board.clone();

        let barrier = Arc::new(CompletionBarrier::new(products.len()));
        let ctx = Arc::new(RunContext {
            store: self.store.clone(),
            pool: self.pool.clone(),
            registry: self.registry.clone(),
            board: board.clone(),
            barrier: barrier.clone(),
            workers: Arc::new(Semaphore::new(self.config.concurrency.max(1))),
            config: self.config.clone(),
        });

        info!(
            tasks = products.len(),
            excluded = excluded.len(),
            concurrency = self.config.concurrency,
            "fanning out price checks"
        );

        let mut set = JoinSet::new();
        for product in products {
            let task = CheckTask::new(product);
            let task_id = task.id.clone();
            let span = info_span!(
                "check_task",
                %task_id,
                variant_id = %task.product.variant_id,
                retailer_id = task.product.retailer_id.as_ref().map(|r| r.as_str()).unwrap_or("unknown")
            );
            let product = task.product.clone();
            board.insert(task);
            set.spawn(run_task(ctx.clone(), task_id, product).instrument(span));
        }

        barrier.wait().await;

        let mut prices = std::collections::HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((task_id, Some(price))) => {
                    prices.insert(task_id, price);
                }
                Ok(_) => {}
                Err(e) => error!("check task aborted: {e}"),
            }
        }

        let results: Vec<TaskReport> = board
            .snapshot()
            .into_iter()
            .map(|t| TaskReport {
                price: prices.get(&t.id).copied(),
                task_id: t.id,
                product_id: t.product.id,
                url: t.product.url,
                variant_id: t.product.variant_id.to_string(),
                retailer_id: t.product.retailer_id.map(|r| r.to_string()),
                region_id: t.product.region_id.to_string(),
                state: t.state,
                attempts: t.attempts,
                failure: t.failure,
            })
            .collect();
        let succeeded = results
            .iter()
            .filter(|r| r.state == TaskState::Succeeded)
            .count();

        let report = CheckRunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            tasks: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            excluded,
            results,
        };
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            excluded = report.excluded.len(),
            "check run complete"
        );
        Ok(report)
    }

    /// Splits the snapshot into checkable products and malformed rows, and
    /// resolves missing retailer tags from the URL host once.
    fn ingest(
        &self,
        rows: Vec<Result<MonitoredProduct, MalformedProduct>>,
    ) -> (Vec<MonitoredProduct>, Vec<MalformedProduct>) {
        let mut products = Vec::new();
        let mut excluded = Vec::new();
        for row in rows {
            match row {
                Ok(mut product) => {
                    if product.retailer_id.is_none() {
                        product.retailer_id = self.registry.identify(&product.url).ok();
                    }
                    products.push(product);
                }
                Err(bad) => {
                    error!(
                        stage = %FailureStage::Ingest,
                        row_id = bad.row_id,
                        url = bad.url.as_deref().unwrap_or(""),
                        "excluding malformed monitored product: {}",
                        bad.reason
                    );
                    excluded.push(bad);
                }
            }
        }
        (products, excluded)
    }

    /// Stage two: price every (variant, region) group.
    ///
    /// Pure read of the store plus publication, so repeated runs without new
    /// samples see identical groups. Fails only when the history query fails.
    pub async fn run_aggregation(&self) -> Result<AggregationReport, DomainError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("aggregation_run", %run_id);
        self.run_aggregation_inner(run_id).instrument(span).await
    }

    async fn run_aggregation_inner(&self, run_id: String) -> Result<AggregationReport, DomainError> {
        let window = self.config.history_window;
        let store = self.store.clone();
        let groups = tokio::task::spawn_blocking(move || {
            store.grouped_price_history(&HistoryFilter::window(window))
        })
        .await
        .map_err(|e| DomainError::Database(format!("history query aborted: {e}")))?
        .map_err(|e| {
            error!(stage = "grouped_history", "aggregation aborted: {e}");
            e
        })?;

        info!(groups = groups.len(), %window, strategy = self.engine.strategy_name(), "pricing groups");

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut set = JoinSet::new();
        for group in groups {
            let engine = self.engine.clone();
            let permits = permits.clone();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                engine.decide_and_publish(&group).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("pricing task aborted: {e}"),
            }
        }
        outcomes.sort_by(|a, b| {
            (a.variant_id.as_str(), a.region_id.as_str())
                .cmp(&(b.variant_id.as_str(), b.region_id.as_str()))
        });

        let published = outcomes.iter().filter(|o| o.is_published()).count();
        let report = AggregationReport {
            run_id,
            window,
            strategy: self.engine.strategy_name().to_string(),
            groups: outcomes.len(),
            published,
            failed: outcomes.len() - published,
            outcomes,
        };
        info!(published = report.published, failed = report.failed, "aggregation complete");
        Ok(report)
    }

    /// Both stages back to back; aggregation starts once the check barrier opens.
    pub async fn run_cycle(&self) -> Result<CycleReport, DomainError> {
        let checks = self.run_checks().await?;
        let aggregation = self.run_aggregation().await?;
        Ok(CycleReport {
            checks,
            aggregation,
        })
    }
}

/// Drives one task through its lifecycle. Returns the task id and, on
/// success, the recorded price.
async fn run_task(
    ctx: Arc<RunContext>,
    task_id: String,
    product: MonitoredProduct,
) -> (String, Option<Decimal>) {
    let _arrival = Arrival {
        barrier: ctx.barrier.clone(),
        board: ctx.board.clone(),
        task_id: task_id.clone(),
    };
    let mut attempts = 0u32;

    loop {
        ctx.board.transition(&task_id, TaskState::Dispatched);
        let permit = match ctx.workers.clone().acquire_owned().await {
            Ok(p) => p,
            Err(e) => {
                ctx.board.transition(&task_id, TaskState::Running);
                ctx.board.fail(
                    &task_id,
                    TaskFailure {
                        stage: FailureStage::Fetch,
                        cause: format!("worker pool closed: {e}"),
                        attempts,
                    },
                );
                return (task_id, None);
            }
        };
        ctx.board.transition(&task_id, TaskState::Running);
        attempts += 1;

        let result = attempt_check(&ctx, &product).await;
        drop(permit);

        match result {
            Ok(sample) => {
                ctx.board.transition(&task_id, TaskState::Succeeded);
                info!(price = %sample.price, attempts, "price recorded");
                return (task_id, Some(sample.price));
            }
            Err(e) if e.transient && attempts < ctx.config.max_attempts => {
                let delay = ctx.config.backoff(attempts);
                warn!(
                    stage = %e.stage,
                    attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "transient failure: {}",
                    e.cause
                );
                ctx.board.transition(&task_id, TaskState::Retrying);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    stage = %e.stage,
                    attempts,
                    product_id = product.id,
                    url = %product.url,
                    "check failed permanently: {}",
                    e.cause
                );
                ctx.board.fail(
                    &task_id,
                    TaskFailure {
                        stage: e.stage,
                        cause: e.cause,
                        attempts,
                    },
                );
                return (task_id, None);
            }
        }
    }
}

async fn attempt_check(ctx: &RunContext, product: &MonitoredProduct) -> Result<PriceSample, AttemptError> {
    let retailer = product.retailer_id.clone().ok_or_else(|| {
        AttemptError::permanent(FailureStage::Route, format!("Unknown retailer: {}", product.url))
    })?;
    let adapter = ctx
        .registry
        .resolve(&retailer)
        .map_err(|e| AttemptError::permanent(FailureStage::Route, e))?;

    let lease = ctx
        .pool
        .acquire()
        .await
        .map_err(|e| AttemptError::transient(FailureStage::Proxy, e))?;

    let timeout = ctx.config.request_timeout;
    let fetched =
        tokio::time::timeout(timeout, adapter.fetch_price(&product.url, lease.endpoint(), timeout)).await;

    let price = match fetched {
        Err(_) => {
            ctx.pool.release(lease, ProxyOutcome::Failure);
            return Err(AttemptError::transient(
                FailureStage::Fetch,
                format!("timed out after {}s", timeout.as_secs_f64()),
            ));
        }
        Ok(Err(failure)) => {
            let outcome = if failure.blames_proxy() {
                ProxyOutcome::Failure
            } else {
                ProxyOutcome::Success
            };
            ctx.pool.release(lease, outcome);
            return Err(AttemptError {
                stage: FailureStage::Fetch,
                transient: failure.is_transient(),
                cause: failure.to_string(),
            });
        }
        Ok(Ok(price)) => {
            ctx.pool.release(lease, ProxyOutcome::Success);
            price
        }
    };

    let sample = PriceSample::observed_now(
        product.variant_id.clone(),
        retailer,
        product.region_id.clone(),
        price,
    );
    let store = ctx.store.clone();
    let to_append = sample.clone();
    tokio::task::spawn_blocking(move || store.append_sample(&to_append))
        .await
        .map_err(|e| AttemptError::transient(FailureStage::Store, e))?
        .map_err(|e| AttemptError::transient(FailureStage::Store, e))?;
    Ok(sample)
}
