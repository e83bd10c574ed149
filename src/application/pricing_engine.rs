use crate::domain::entities::price_group::PriceGroup;
use crate::domain::error::DomainError;
use crate::domain::ports::pricing_strategy::PricingStrategy;
use crate::domain::ports::storefront::{DecidedPrice, StorefrontPublisher};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    Published {
        price: Decimal,
        reference: Option<String>,
    },
    DecisionFailed {
        error: String,
    },
    PublishFailed {
        price: Decimal,
        error: String,
    },
}

/// Result of pricing one (variant, region) group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub variant_id: String,
    pub region_id: String,
    pub samples: usize,
    #[serde(flatten)]
    pub status: GroupStatus,
}

impl GroupOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self.status, GroupStatus::Published { .. })
    }
}

/// Turns price histories into storefront prices.
#[derive(Clone)]
pub struct PricingEngine {
    strategy: Arc<dyn PricingStrategy>,
    publisher: Arc<dyn StorefrontPublisher>,
}

impl PricingEngine {
    pub fn new(strategy: Arc<dyn PricingStrategy>, publisher: Arc<dyn StorefrontPublisher>) -> Self {
        Self { strategy, publisher }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn decide(&self, group: &PriceGroup) -> Result<DecidedPrice, DomainError> {
        let price = self.strategy.decide(group)?;
        Ok(DecidedPrice {
            variant_id: group.variant_id.clone(),
            region_id: group.region_id.clone(),
            price,
            strategy: self.strategy.name().to_string(),
            decided_at: Utc::now(),
        })
    }

    /// Decides, then hands the price to the storefront. A failed publish is
    /// reported in the outcome, never retried here.
    pub async fn decide_and_publish(&self, group: &PriceGroup) -> GroupOutcome {
        let status = match self.decide(group) {
            Err(e) => {
                error!(
                    variant_id = %group.variant_id,
                    region_id = %group.region_id,
                    stage = "decide",
                    "pricing decision failed: {e}"
                );
                GroupStatus::DecisionFailed {
                    error: e.to_string(),
                }
            }
            Ok(decided) => match self.publisher.publish(&decided).await {
                Ok(ack) => {
                    info!(
                        variant_id = %decided.variant_id,
                        region_id = %decided.region_id,
                        price = %decided.price,
                        publisher = self.publisher.name(),
                        "price published"
                    );
                    GroupStatus::Published {
                        price: decided.price,
                        reference: ack.reference,
                    }
                }
                Err(e) => {
                    error!(
                        variant_id = %decided.variant_id,
                        region_id = %decided.region_id,
                        stage = "publish",
                        publisher = self.publisher.name(),
                        "publish failed: {e}"
                    );
                    GroupStatus::PublishFailed {
                        price: decided.price,
                        error: e.to_string(),
                    }
                }
            },
        };

        GroupOutcome {
            variant_id: group.variant_id.to_string(),
            region_id: group.region_id.to_string(),
            samples: group.samples.len(),
            status,
        }
    }
}
