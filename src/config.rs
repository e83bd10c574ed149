use crate::application::orchestrator::OrchestratorConfig;
use crate::application::proxy_pool::ProxyPoolConfig;
use crate::domain::entities::proxy::ProxyEndpoint;
use crate::domain::error::DomainError;
use crate::domain::values::history_window::HistoryWindow;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read from `PRICEWATCH_*` environment variables (and a
/// `.env` file when present). Every setting has a default.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub db_path: String,
    pub proxies: Vec<ProxyEndpoint>,
    pub proxy_pool: ProxyPoolConfig,
    pub orchestrator: OrchestratorConfig,
    /// Extra `(retailer tag, host pattern)` routes on top of the built-in ones.
    pub retailer_hosts: Vec<(String, String)>,
    pub storefront_url: Option<String>,
    pub storefront_token: Option<String>,
    pub schedule: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: "./pricewatch.db".into(),
            proxies: Vec::new(),
            proxy_pool: ProxyPoolConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            retailer_hosts: Vec::new(),
            storefront_url: None,
            storefront_token: None,
            schedule: Duration::from_secs(3600),
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, DomainError>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DomainError::Config(format!("{name}={raw}: {e}"))),
    }
}

/// `direct, http://10.0.0.1:8080, socks5://proxy:1080`
pub fn parse_proxy_list(raw: &str) -> Result<Vec<ProxyEndpoint>, DomainError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(DomainError::Config))
        .collect()
}

/// `decathlon=decathlon.es, fnac=fnac.*`
pub fn parse_retailer_hosts(raw: &str) -> Result<Vec<(String, String)>, DomainError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(tag, host)| (tag.trim().to_string(), host.trim().to_string()))
                .filter(|(tag, host)| !tag.is_empty() && !host.is_empty())
                .ok_or_else(|| DomainError::Config(format!("Expected tag=host, got: {pair}")))
        })
        .collect()
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, DomainError> {
        dotenv::dotenv().ok();
        let d = PipelineConfig::default();

        let proxies = match var("PRICEWATCH_PROXIES") {
            Some(raw) => parse_proxy_list(&raw)?,
            None => Vec::new(),
        };
        let retailer_hosts = match var("PRICEWATCH_RETAILER_HOSTS") {
            Some(raw) => parse_retailer_hosts(&raw)?,
            None => Vec::new(),
        };

        let concurrency: usize = parsed("PRICEWATCH_CONCURRENCY", d.orchestrator.concurrency)?;
        if concurrency == 0 {
            return Err(DomainError::Config("PRICEWATCH_CONCURRENCY must be at least 1".into()));
        }
        let max_attempts: u32 = parsed("PRICEWATCH_MAX_ATTEMPTS", d.orchestrator.max_attempts)?;
        if max_attempts == 0 {
            return Err(DomainError::Config("PRICEWATCH_MAX_ATTEMPTS must be at least 1".into()));
        }
        let failure_threshold: u32 = parsed(
            "PRICEWATCH_PROXY_FAILURE_THRESHOLD",
            d.proxy_pool.failure_threshold,
        )?;
        if failure_threshold == 0 {
            return Err(DomainError::Config(
                "PRICEWATCH_PROXY_FAILURE_THRESHOLD must be at least 1".into(),
            ));
        }

        Ok(Self {
            db_path: var("PRICEWATCH_DB").unwrap_or(d.db_path),
            proxies,
            proxy_pool: ProxyPoolConfig {
                failure_threshold,
                cooldown: Duration::from_secs(parsed(
                    "PRICEWATCH_PROXY_COOLDOWN_SECS",
                    d.proxy_pool.cooldown.as_secs(),
                )?),
            },
            orchestrator: OrchestratorConfig {
                concurrency,
                max_attempts,
                backoff_base: Duration::from_millis(parsed(
                    "PRICEWATCH_BACKOFF_MS",
                    d.orchestrator.backoff_base.as_millis() as u64,
                )?),
                backoff_cap: d.orchestrator.backoff_cap,
                request_timeout: Duration::from_secs(parsed(
                    "PRICEWATCH_REQUEST_TIMEOUT_SECS",
                    d.orchestrator.request_timeout.as_secs(),
                )?),
                history_window: parsed::<HistoryWindow>(
                    "PRICEWATCH_HISTORY_WINDOW",
                    d.orchestrator.history_window,
                )?,
            },
            retailer_hosts,
            storefront_url: var("PRICEWATCH_STOREFRONT_URL"),
            storefront_token: var("PRICEWATCH_STOREFRONT_TOKEN"),
            schedule: Duration::from_secs(parsed("PRICEWATCH_SCHEDULE_SECS", d.schedule.as_secs())?),
        })
    }
}
