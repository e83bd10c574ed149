use crate::domain::values::ids::{RegionId, RetailerId, VariantId};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One observed retailer price. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub variant_id: VariantId,
    pub retailer_id: RetailerId,
    pub region_id: RegionId,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn observed_now(
        variant_id: VariantId,
        retailer_id: RetailerId,
        region_id: RegionId,
        price: Decimal,
    ) -> Self {
        Self {
            variant_id,
            retailer_id,
            region_id,
            price,
            observed_at: Utc::now(),
        }
    }
}

/// Fixed-width RFC 3339 (microseconds, `Z`) so lexical order equals time order.
pub fn timestamp_key(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
