use super::price_extract::{extract_price, looks_blocked};
use crate::domain::entities::proxy::ProxyEndpoint;
use crate::domain::ports::retailer_adapter::{FetchFailure, RetailerAdapter};
use crate::domain::values::ids::RetailerId;
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Fetches a retailer product page through the leased proxy and reads the
/// price the page embeds for search engines.
pub struct HttpRetailerAdapter {
    retailer: RetailerId,
    user_agent: String,
}

impl HttpRetailerAdapter {
    pub fn new(retailer: RetailerId) -> Self {
        Self {
            retailer,
            user_agent: USER_AGENT.into(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn client(&self, proxy: &ProxyEndpoint, timeout: Duration) -> Result<reqwest::Client, FetchFailure> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(timeout)
            .connect_timeout(timeout);
        builder = match proxy.url() {
            Some(url) => builder.proxy(
                reqwest::Proxy::all(&url)
                    .map_err(|e| FetchFailure::TransientNetwork(format!("bad proxy {proxy}: {e}")))?,
            ),
            None => builder.no_proxy(),
        };
        builder
            .build()
            .map_err(|e| FetchFailure::TransientNetwork(format!("client build failed: {e}")))
    }
}

fn classify_status(status: StatusCode) -> Option<FetchFailure> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            FetchFailure::Blocked(format!("HTTP {status}"))
        }
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            FetchFailure::TransientNetwork(format!("HTTP {s}"))
        }
        s => FetchFailure::ParseError(format!("unexpected HTTP {s}")),
    })
}

#[async_trait]
impl RetailerAdapter for HttpRetailerAdapter {
    fn retailer(&self) -> &RetailerId {
        &self.retailer
    }

    async fn fetch_price(
        &self,
        url: &str,
        proxy: &ProxyEndpoint,
        timeout: Duration,
    ) -> Result<Decimal, FetchFailure> {
        let client = self.client(proxy, timeout)?;
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::TransientNetwork(e.to_string()))?;

        if let Some(failure) = classify_status(resp.status()) {
            return Err(failure);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchFailure::TransientNetwork(e.to_string()))?;

        match extract_price(&body) {
            Some(price) => {
                debug!(retailer = %self.retailer, %url, %price, "price extracted");
                Ok(price)
            }
            None if looks_blocked(&body) => {
                Err(FetchFailure::Blocked("captcha or robot check page".into()))
            }
            None => Err(FetchFailure::ParseError(format!(
                "no price found in {} bytes",
                body.len()
            ))),
        }
    }
}
