use crate::domain::ports::retailer_adapter::RetailerAdapter;
use crate::domain::values::ids::RetailerId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Catalog or configuration problem; never retried.
    #[error("Unknown retailer: {0}")]
    Unknown(String),
}

/// Host pattern of a retailer site.
///
/// `tradeinn.com` matches that domain and its subdomains. `amazon.*` matches
/// the `amazon` label under any one- or two-label suffix (`amazon.es`,
/// `www.amazon.co.uk`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Domain(String),
    AnySuffix(String),
}

impl HostPattern {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim().trim_start_matches("www.").to_ascii_lowercase();
        if raw.is_empty() || raw.contains('/') || raw.contains(' ') {
            return Err(format!("Invalid host pattern: {raw:?}"));
        }
        match raw.strip_suffix(".*") {
            Some(base) if !base.is_empty() && !base.contains('.') => {
                Ok(HostPattern::AnySuffix(base.to_string()))
            }
            Some(_) => Err(format!("Wildcard must be a single label: {raw}")),
            None => Ok(HostPattern::Domain(raw)),
        }
    }

    /// Match strength; exact domains always outrank wildcard patterns, and
    /// longer patterns outrank shorter ones.
    fn specificity(&self, host: &str) -> Option<(u8, usize)> {
        match self {
            HostPattern::Domain(domain) => {
                let hit = host == domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'));
                hit.then_some((1, domain.len()))
            }
            HostPattern::AnySuffix(base) => {
                let labels: Vec<&str> = host.split('.').collect();
                let hit = labels.iter().enumerate().any(|(i, label)| {
                    let suffix = labels.len() - i - 1;
                    label == base && (1..=2).contains(&suffix)
                });
                hit.then_some((0, base.len()))
            }
        }
    }
}

impl std::fmt::Display for HostPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostPattern::Domain(d) => f.write_str(d),
            HostPattern::AnySuffix(b) => write!(f, "{b}.*"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    pub retailer_id: String,
    pub hosts: Vec<String>,
    pub has_adapter: bool,
}

/// Maps retailer tags to adapters and product hosts to retailer tags.
///
/// The host table is consulted once, when a product is ingested. Tasks are
/// dispatched by the stored tag.
#[derive(Default)]
pub struct RetailerRegistry {
    hosts: Vec<(HostPattern, RetailerId)>,
    adapters: HashMap<RetailerId, Arc<dyn RetailerAdapter>>,
}

impl RetailerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn RetailerAdapter>) {
        self.adapters.insert(adapter.retailer().clone(), adapter);
    }

    pub fn map_host(&mut self, pattern: HostPattern, retailer: RetailerId) {
        self.hosts.push((pattern, retailer));
    }

    /// Retailer tag for a product URL, by its host.
    pub fn identify(&self, url: &str) -> Result<RetailerId, RouteError> {
        let parsed =
            url::Url::parse(url.trim()).map_err(|e| RouteError::Unknown(format!("{url} ({e})")))?;
        let host = parsed
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| RouteError::Unknown(format!("{url} (no host)")))?;

        let mut best: Option<((u8, usize), &RetailerId)> = None;
        for (pattern, retailer) in &self.hosts {
            if let Some(score) = pattern.specificity(&host) {
                if best.map_or(true, |(b, _)| score > b) {
                    best = Some((score, retailer));
                }
            }
        }
        best.map(|(_, r)| r.clone())
            .ok_or_else(|| RouteError::Unknown(url.to_string()))
    }

    /// Adapter registered for a retailer tag.
    pub fn resolve(&self, retailer: &RetailerId) -> Result<Arc<dyn RetailerAdapter>, RouteError> {
        self.adapters
            .get(retailer)
            .cloned()
            .ok_or_else(|| RouteError::Unknown(format!("no adapter for retailer '{retailer}'")))
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut by_retailer: HashMap<&RetailerId, Vec<String>> = HashMap::new();
        for (pattern, retailer) in &self.hosts {
            by_retailer.entry(retailer).or_default().push(pattern.to_string());
        }
        for retailer in self.adapters.keys() {
            by_retailer.entry(retailer).or_default();
        }
        let mut routes: Vec<RouteInfo> = by_retailer
            .into_iter()
            .map(|(retailer, hosts)| RouteInfo {
                retailer_id: retailer.to_string(),
                hosts,
                has_adapter: self.adapters.contains_key(retailer),
            })
            .collect();
        routes.sort_by(|a, b| a.retailer_id.cmp(&b.retailer_id));
        routes
    }
}
