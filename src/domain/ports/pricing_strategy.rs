//! Pricing strategy port.
//!
//! The business rule that turns competitor prices into a storefront price is
//! injected through [`PricingStrategy`], so the pricing engine can be tested
//! with any rule.

use crate::domain::entities::price_group::PriceGroup;
use crate::domain::error::DomainError;
use rust_decimal::Decimal;

/// Decides a storefront price from a merged price history.
///
/// # Example
///
/// ```ignore
/// struct Fixed(Decimal);
///
/// impl PricingStrategy for Fixed {
///     fn name(&self) -> &'static str { "fixed" }
///
///     fn decide(&self, _group: &PriceGroup) -> Result<Decimal, DomainError> {
///         Ok(self.0)
///     }
/// }
/// ```
pub trait PricingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn decide(&self, group: &PriceGroup) -> Result<Decimal, DomainError>;
}
