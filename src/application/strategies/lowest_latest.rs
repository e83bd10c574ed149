use crate::domain::entities::price_group::PriceGroup;
use crate::domain::error::DomainError;
use crate::domain::ports::pricing_strategy::PricingStrategy;
use rust_decimal::Decimal;

/// Lowest of each retailer's newest price.
///
/// A plain reference rule; production deployments inject their own.
pub struct LowestLatestStrategy;

impl PricingStrategy for LowestLatestStrategy {
    fn name(&self) -> &'static str {
        "lowest_latest"
    }

    fn decide(&self, group: &PriceGroup) -> Result<Decimal, DomainError> {
        group
            .latest_per_retailer()
            .into_iter()
            .map(|s| s.price)
            .min()
            .ok_or_else(|| {
                DomainError::Strategy(format!(
                    "no samples for {}/{}",
                    group.variant_id, group.region_id
                ))
            })
    }
}
