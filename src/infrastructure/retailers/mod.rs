pub mod http_adapter;
pub mod price_extract;

use crate::application::adapter_registry::{HostPattern, RetailerRegistry};
use crate::domain::error::DomainError;
use crate::domain::values::ids::RetailerId;
use http_adapter::HttpRetailerAdapter;
use std::sync::Arc;

/// Retailers supported out of the box and the hosts they serve.
pub const DEFAULT_RETAILER_HOSTS: &[(&str, &str)] = &[
    ("amazon", "amazon.*"),
    ("tradeinn", "tradeinn.com"),
    ("pccomponentes", "pccomponentes.com"),
];

/// Registry with an HTTP adapter for every default retailer plus any
/// `(tag, host)` pairs from configuration.
pub fn default_registry(extra_hosts: &[(String, String)]) -> Result<RetailerRegistry, DomainError> {
    let mut registry = RetailerRegistry::new();
    let pairs = DEFAULT_RETAILER_HOSTS
        .iter()
        .map(|(t, h)| (t.to_string(), h.to_string()))
        .chain(extra_hosts.iter().cloned());

    for (tag, host) in pairs {
        let retailer = RetailerId::tag(&tag)?;
        let pattern = HostPattern::parse(&host).map_err(DomainError::Config)?;
        if registry.resolve(&retailer).is_err() {
            registry.register(Arc::new(HttpRetailerAdapter::new(retailer.clone())));
        }
        registry.map_host(pattern, retailer);
    }
    Ok(registry)
}
