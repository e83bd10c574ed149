//! Shared test helpers: scripted retailer adapters, a recording storefront
//! and a pipeline builder over an in-memory or on-disk store.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pricewatch::application::adapter_registry::{HostPattern, RetailerRegistry};
use pricewatch::application::orchestrator::OrchestratorConfig;
use pricewatch::application::proxy_pool::{ProxyPool, ProxyPoolConfig};
use pricewatch::application::strategies::lowest_latest::LowestLatestStrategy;
use pricewatch::domain::entities::monitored_product::MonitoredRow;
use pricewatch::domain::entities::price_group::PriceGroup;
use pricewatch::domain::entities::price_sample::PriceSample;
use pricewatch::domain::entities::proxy::ProxyEndpoint;
use pricewatch::domain::error::DomainError;
use pricewatch::domain::ports::retailer_adapter::{FetchFailure, RetailerAdapter};
use pricewatch::domain::ports::sample_store::{HistoryFilter, NewMonitored, SampleStore};
use pricewatch::domain::ports::storefront::{DecidedPrice, PublishAck, StorefrontPublisher};
use pricewatch::domain::values::ids::RetailerId;
use pricewatch::infrastructure::sqlite::sample_store::SqliteSampleStore;
use pricewatch::PriceWatch;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn memory_store() -> Arc<SqliteSampleStore> {
    Arc::new(SqliteSampleStore::open(":memory:").unwrap())
}

/// Short backoff so retry tests finish quickly.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        concurrency: 4,
        max_attempts: 3,
        backoff_base: Duration::from_millis(1),
        backoff_cap: Duration::from_millis(5),
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

pub fn proxies(n: usize) -> Vec<ProxyEndpoint> {
    (0..n)
        .map(|i| format!("http://10.0.0.{}:8080", i + 1).parse().unwrap())
        .collect()
}

/// Answers from a per-URL script. Each call pops the next scripted result;
/// once a URL's script runs dry its last result repeats.
pub struct ScriptedAdapter {
    retailer: RetailerId,
    scripts: Mutex<HashMap<String, VecDeque<Result<Decimal, FetchFailure>>>>,
    last: Mutex<HashMap<String, Result<Decimal, FetchFailure>>>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub delay: Duration,
    panics_left: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(tag: &str) -> Self {
        Self {
            retailer: RetailerId::tag(tag).unwrap(),
            scripts: Mutex::new(HashMap::new()),
            last: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            panics_left: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The first `n` fetches panic instead of answering.
    pub fn panicking(self, n: usize) -> Self {
        self.panics_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn price(self, url: &str, price: &str) -> Self {
        self.script(url, vec![Ok(dec(price))])
    }

    pub fn script(self, url: &str, results: Vec<Result<Decimal, FetchFailure>>) -> Self {
        self.scripts.lock().insert(url.to_string(), results.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetailerAdapter for ScriptedAdapter {
    fn retailer(&self) -> &RetailerId {
        &self.retailer
    }

    async fn fetch_price(
        &self,
        url: &str,
        _proxy: &ProxyEndpoint,
        _timeout: Duration,
    ) -> Result<Decimal, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("adapter blew up on {url}");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let next = self.scripts.lock().get_mut(url).and_then(|q| q.pop_front());
        match next {
            Some(result) => {
                self.last.lock().insert(url.to_string(), result.clone());
                result
            }
            None => self
                .last
                .lock()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(FetchFailure::ParseError(format!("no script for {url}")))),
        }
    }
}

/// Records every publish; fails for the listed variant ids.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<DecidedPrice>>,
    pub fail_variants: HashSet<String>,
}

impl RecordingPublisher {
    pub fn failing_for(variants: &[&str]) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail_variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn prices(&self) -> Vec<(String, String, Decimal)> {
        let mut out: Vec<_> = self
            .published
            .lock()
            .iter()
            .map(|d| (d.variant_id.to_string(), d.region_id.to_string(), d.price))
            .collect();
        out.sort();
        out
    }
}

#[async_trait]
impl StorefrontPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, price: &DecidedPrice) -> Result<PublishAck, DomainError> {
        if self.fail_variants.contains(price.variant_id.as_str()) {
            return Err(DomainError::Publish(format!(
                "storefront rejected {}",
                price.variant_id
            )));
        }
        self.published.lock().push(price.clone());
        Ok(PublishAck {
            reference: Some(format!("ref-{}", price.variant_id)),
        })
    }
}

/// Delegates to an inner store but can be told to fail reads, or to fail
/// the next `n` appends.
pub struct FlakyStore {
    pub inner: Arc<SqliteSampleStore>,
    pub fail_list: bool,
    pub fail_history: bool,
    pub fail_appends: AtomicUsize,
    pub append_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteSampleStore>) -> Self {
        Self {
            inner,
            fail_list: false,
            fail_history: false,
            fail_appends: AtomicUsize::new(0),
            append_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_history(mut self) -> Self {
        self.fail_history = true;
        self
    }

    pub fn failing_appends(self, n: usize) -> Self {
        self.fail_appends.store(n, Ordering::SeqCst);
        self
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

impl SampleStore for FlakyStore {
    fn list_monitored_products(&self) -> Result<Vec<MonitoredRow>, DomainError> {
        if self.fail_list {
            return Err(DomainError::Database("disk I/O error".into()));
        }
        self.inner.list_monitored_products()
    }

    fn append_sample(&self, sample: &PriceSample) -> Result<(), DomainError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DomainError::Database("database is locked".into()));
        }
        self.inner.append_sample(sample)
    }

    fn visit_price_history(
        &self,
        filter: &HistoryFilter,
        visit: &mut dyn FnMut(PriceGroup) -> Result<(), DomainError>,
    ) -> Result<usize, DomainError> {
        if self.fail_history {
            return Err(DomainError::Database("disk I/O error".into()));
        }
        self.inner.visit_price_history(filter, visit)
    }

    fn add_monitored(&self, product: &NewMonitored) -> Result<i64, DomainError> {
        self.inner.add_monitored(product)
    }

    fn remove_monitored(&self, id: i64) -> Result<(), DomainError> {
        self.inner.remove_monitored(id)
    }

    fn sample_count(&self) -> Result<usize, DomainError> {
        self.inner.sample_count()
    }
}

/// Registry routing `amazon.*` and `tradeinn.com` to the given adapters.
pub fn registry(adapters: Vec<Arc<ScriptedAdapter>>) -> RetailerRegistry {
    let mut registry = RetailerRegistry::new();
    for adapter in adapters {
        let tag = adapter.retailer().clone();
        let pattern = match tag.as_str() {
            "amazon" => "amazon.*".to_string(),
            other => format!("{other}.com"),
        };
        registry.register(adapter);
        registry.map_host(HostPattern::parse(&pattern).unwrap(), tag);
    }
    registry
}

pub fn pipeline(
    store: Arc<dyn SampleStore>,
    adapters: Vec<Arc<ScriptedAdapter>>,
    proxy_count: usize,
    publisher: Arc<RecordingPublisher>,
    config: OrchestratorConfig,
) -> PriceWatch {
    PriceWatch::with_collaborators(
        store,
        ProxyPool::new(proxies(proxy_count), ProxyPoolConfig::default()),
        registry(adapters),
        Arc::new(LowestLatestStrategy),
        publisher,
        config,
    )
}
