use crate::domain::values::ids::{RegionId, RetailerId, VariantId};
use serde::{Deserialize, Serialize};

/// A retailer page watched for one storefront variant in one region.
///
/// `retailer_id` is resolved from the URL host when the product is
/// ingested. It is `None` only when no registered retailer serves the host;
/// such a product is still checked, and fails as an unknown retailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredProduct {
    pub id: i64,
    pub url: String,
    pub variant_id: VariantId,
    pub retailer_id: Option<RetailerId>,
    pub region_id: RegionId,
}

/// A monitored row that could not be read into canonical form.
#[derive(Debug, Clone, Serialize)]
pub struct MalformedProduct {
    pub row_id: i64,
    pub url: Option<String>,
    pub reason: String,
}

pub type MonitoredRow = Result<MonitoredProduct, MalformedProduct>;
