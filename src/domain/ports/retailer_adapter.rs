use crate::domain::entities::proxy::ProxyEndpoint;
use crate::domain::values::ids::RetailerId;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Typed failure reported by a retailer adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("blocked by retailer: {0}")]
    Blocked(String),
}

impl FetchFailure {
    /// Worth retrying, possibly through another proxy.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchFailure::ParseError(_))
    }

    /// Counts against the proxy's health.
    pub fn blames_proxy(&self) -> bool {
        self.is_transient()
    }
}

/// Per-retailer price lookup.
///
/// Implementations must not mutate shared state and must give up once
/// `timeout` has elapsed.
#[async_trait]
pub trait RetailerAdapter: Send + Sync {
    fn retailer(&self) -> &RetailerId;

    async fn fetch_price(
        &self,
        url: &str,
        proxy: &ProxyEndpoint,
        timeout: Duration,
    ) -> Result<Decimal, FetchFailure>;
}
