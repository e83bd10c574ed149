use crate::domain::error::DomainError;
use crate::domain::ports::storefront::{DecidedPrice, PublishAck, StorefrontPublisher};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pushes decided prices to a storefront pricing endpoint as JSON.
pub struct HttpPublisher {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct PriceUpdate<'a> {
    variant_id: &'a str,
    region_id: &'a str,
    price: Decimal,
}

#[derive(Deserialize, Default)]
struct PriceUpdateResponse {
    #[serde(default)]
    id: Option<String>,
}

impl HttpPublisher {
    pub fn new(endpoint: String, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .user_agent("pricewatch/0.1")
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            endpoint,
            token,
        }
    }
}

#[async_trait::async_trait]
impl StorefrontPublisher for HttpPublisher {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, price: &DecidedPrice) -> Result<PublishAck, DomainError> {
        let mut req = self.client.post(&self.endpoint).json(&PriceUpdate {
            variant_id: price.variant_id.as_str(),
            region_id: price.region_id.as_str(),
            price: price.price,
        });
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| DomainError::Publish(format!("storefront unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::Publish(format!("storefront {status}: {body}")));
        }

        let ack: PriceUpdateResponse = resp.json().await.unwrap_or_default();
        Ok(PublishAck { reference: ack.id })
    }
}
