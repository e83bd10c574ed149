use crate::domain::error::DomainError;
use crate::domain::ports::storefront::{DecidedPrice, PublishAck, StorefrontPublisher};
use tracing::info;

/// Records decisions in the log instead of pushing them anywhere.
pub struct LogPublisher;

#[async_trait::async_trait]
impl StorefrontPublisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, price: &DecidedPrice) -> Result<PublishAck, DomainError> {
        info!(
            variant_id = %price.variant_id,
            region_id = %price.region_id,
            price = %price.price,
            strategy = %price.strategy,
            "decided price"
        );
        Ok(PublishAck::default())
    }
}
