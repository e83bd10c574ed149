use crate::domain::error::DomainError;
use crate::domain::values::ids::{RegionId, VariantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Price chosen for one (variant, region) group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecidedPrice {
    pub variant_id: VariantId,
    pub region_id: RegionId,
    pub price: Decimal,
    pub strategy: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishAck {
    /// Storefront-side reference, when the storefront returns one.
    pub reference: Option<String>,
}

/// Hands decided prices to the storefront. Fire-and-report: the caller does
/// not retry a failed publish.
#[async_trait]
pub trait StorefrontPublisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, price: &DecidedPrice) -> Result<PublishAck, DomainError>;
}
