//! Aggregation stage and full cycles: grouping, pricing, publication and
//! history windows.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use pricewatch::application::pricing_engine::GroupStatus;
use pricewatch::application::proxy_pool::{ProxyPool, ProxyPoolConfig};
use pricewatch::domain::entities::price_group::PriceGroup;
use pricewatch::domain::entities::price_sample::PriceSample;
use pricewatch::domain::error::DomainError;
use pricewatch::domain::ports::pricing_strategy::PricingStrategy;
use pricewatch::domain::ports::retailer_adapter::FetchFailure;
use pricewatch::domain::ports::sample_store::{HistoryFilter, SampleStore};
use pricewatch::domain::values::history_window::HistoryWindow;
use pricewatch::domain::values::ids::{RegionId, RetailerId, VariantId};
use pricewatch::PriceWatch;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Highest price in the group; refuses groups from a single retailer.
struct HighestMultiRetailer;

impl PricingStrategy for HighestMultiRetailer {
    fn name(&self) -> &'static str {
        "highest_multi"
    }

    fn decide(&self, group: &PriceGroup) -> Result<Decimal, DomainError> {
        let latest = group.latest_per_retailer();
        if latest.len() < 2 {
            return Err(DomainError::Strategy(format!(
                "only {} retailer(s) for {}",
                latest.len(),
                group.variant_id
            )));
        }
        latest
            .iter()
            .map(|s| s.price)
            .max()
            .ok_or_else(|| DomainError::Strategy("empty group".into()))
    }
}

fn sample(variant: &str, retailer: &str, region: &str, price: &str, minutes_ago: i64) -> PriceSample {
    PriceSample {
        variant_id: VariantId::parse(variant).unwrap(),
        retailer_id: RetailerId::tag(retailer).unwrap(),
        region_id: RegionId::parse(region).unwrap(),
        price: dec(price),
        observed_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
}

#[tokio::test]
async fn test_cycle_prices_amazon_product_in_its_region() {
    let store = memory_store();
    let url = "https://www.amazon.es/dp/B08XYZ";
    let amazon = Arc::new(ScriptedAdapter::new("amazon").price(url, "42.90"));
    let publisher = Arc::new(RecordingPublisher::default());
    let pw = pipeline(store.clone(), vec![amazon], 1, publisher.clone(), fast_config());
    let product = pw.add_monitored(url, "var-7", "es", None).unwrap();
    assert_eq!(product.retailer_id.as_ref().map(|r| r.as_str()), Some("amazon"));

    let report = pw.run_cycle().await.unwrap();
    assert_eq!(report.checks.succeeded, 1);
    assert_eq!(report.aggregation.groups, 1);
    assert_eq!(report.aggregation.published, 1);
    assert_eq!(report.aggregation.strategy, "lowest_latest");

    let groups = pw.history(&HistoryFilter::default()).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].variant_id.as_str(), "var-7");
    assert_eq!(groups[0].region_id.as_str(), "es");
    assert_eq!(groups[0].samples[0].retailer_id.as_str(), "amazon");
    assert_eq!(
        publisher.prices(),
        vec![("var-7".to_string(), "es".to_string(), dec("42.90"))]
    );
}

#[tokio::test]
async fn test_lowest_latest_price_across_retailers() {
    let store = memory_store();
    store.append_sample(&sample("v-1", "amazon", "es", "30.00", 60)).unwrap();
    store.append_sample(&sample("v-1", "amazon", "es", "27.50", 5)).unwrap();
    store.append_sample(&sample("v-1", "tradeinn", "es", "25.00", 120)).unwrap();
    store.append_sample(&sample("v-1", "tradeinn", "es", "29.00", 10)).unwrap();
    // Old low price from amazon must not win over its latest observation.
    store.append_sample(&sample("v-1", "amazon", "es", "10.00", 600)).unwrap();

    let publisher = Arc::new(RecordingPublisher::default());
    let pw = pipeline(store, vec![], 1, publisher.clone(), fast_config());

    let report = pw.run_aggregation().await.unwrap();
    assert_eq!(report.published, 1);
    match &report.outcomes[0].status {
        GroupStatus::Published { price, reference } => {
            assert_eq!(*price, dec("27.50"));
            assert_eq!(reference.as_deref(), Some("ref-v-1"));
        }
        other => panic!("expected published, got {other:?}"),
    }
    assert_eq!(report.outcomes[0].samples, 5);
}

#[tokio::test]
async fn test_samples_are_grouped_newest_first() {
    let store = memory_store();
    let offsets = [30, 5, 90, 1, 45];
    for (i, minutes) in offsets.iter().enumerate() {
        let retailer = if i % 2 == 0 { "amazon" } else { "tradeinn" };
        store
            .append_sample(&sample("v-1", retailer, "es", "10.00", *minutes))
            .unwrap();
        store
            .append_sample(&sample("v-2", retailer, "pt", "11.00", *minutes))
            .unwrap();
    }
    store.append_sample(&sample("v-1", "amazon", "pt", "12.00", 3)).unwrap();

    let groups = store.grouped_price_history(&HistoryFilter::default()).unwrap();
    let keys: Vec<(&str, &str)> = groups
        .iter()
        .map(|g| (g.variant_id.as_str(), g.region_id.as_str()))
        .collect();
    assert_eq!(keys, vec![("v-1", "es"), ("v-1", "pt"), ("v-2", "pt")]);
    for group in &groups {
        assert!(group.is_newest_first());
        assert!(!group.samples.is_empty());
    }
    assert_eq!(groups[0].samples.len(), 5);

    let filtered = store
        .grouped_price_history(&HistoryFilter {
            region_id: Some(RegionId::parse("pt").unwrap()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(filtered.len(), 2);
}

#[tokio::test]
async fn test_aggregation_is_idempotent_without_new_samples() {
    let store = memory_store();
    store.append_sample(&sample("v-1", "amazon", "es", "19.99", 10)).unwrap();
    store.append_sample(&sample("v-2", "amazon", "es", "5.00", 10)).unwrap();
    store.append_sample(&sample("v-2", "tradeinn", "es", "4.75", 3)).unwrap();

    let publisher = Arc::new(RecordingPublisher::default());
    let pw = pipeline(store.clone(), vec![], 1, publisher.clone(), fast_config());

    let history_before = pw.history(&HistoryFilter::default()).unwrap();
    let first = pw.run_aggregation().await.unwrap();
    let first_prices = publisher.prices();
    publisher.published.lock().clear();
    let second = pw.run_aggregation().await.unwrap();

    assert_eq!(first.groups, second.groups);
    assert_eq!(first_prices, publisher.prices());
    assert_eq!(history_before, pw.history(&HistoryFilter::default()).unwrap());
    assert_eq!(store.sample_count().unwrap(), 3);
}

#[tokio::test]
async fn test_publish_failure_is_isolated_to_its_group() {
    let store = memory_store();
    for v in ["v-1", "v-2", "v-3"] {
        store.append_sample(&sample(v, "amazon", "es", "8.00", 1)).unwrap();
    }
    let publisher = Arc::new(RecordingPublisher::failing_for(&["v-2"]));
    let pw = pipeline(store, vec![], 1, publisher.clone(), fast_config());

    let report = pw.run_aggregation().await.unwrap();
    assert_eq!(report.groups, 3);
    assert_eq!(report.published, 2);
    assert_eq!(report.failed, 1);
    let failed = &report.outcomes[1];
    assert_eq!(failed.variant_id, "v-2");
    assert!(matches!(
        &failed.status,
        GroupStatus::PublishFailed { error, .. } if error.contains("storefront rejected")
    ));
    assert_eq!(publisher.prices().len(), 2);
}

#[tokio::test]
async fn test_history_read_failure_aborts_aggregation() {
    let inner = memory_store();
    inner.append_sample(&sample("v-1", "amazon", "es", "8.00", 1)).unwrap();
    let flaky = Arc::new(FlakyStore::new(inner).failing_history());
    let publisher = Arc::new(RecordingPublisher::default());
    let pw = pipeline(flaky, vec![], 1, publisher.clone(), fast_config());

    assert!(pw.run_aggregation().await.is_err());
    assert!(pw.run_cycle().await.is_err());
    assert!(publisher.prices().is_empty());
}

#[tokio::test]
async fn test_latest_per_retailer_window() {
    let store = memory_store();
    store.append_sample(&sample("v-1", "amazon", "es", "30.00", 60)).unwrap();
    store.append_sample(&sample("v-1", "amazon", "es", "28.00", 2)).unwrap();
    store.append_sample(&sample("v-1", "tradeinn", "es", "29.00", 30)).unwrap();

    let groups = store
        .grouped_price_history(&HistoryFilter::window(HistoryWindow::LatestPerRetailer))
        .unwrap();
    assert_eq!(groups.len(), 1);
    let prices: Vec<_> = groups[0].samples.iter().map(|s| s.price).collect();
    assert_eq!(prices, vec![dec("28.00"), dec("29.00")]);
}

#[tokio::test]
async fn test_since_window_drops_old_samples_and_empty_groups() {
    let store = memory_store();
    store.append_sample(&sample("v-1", "amazon", "es", "30.00", 10)).unwrap();
    store.append_sample(&sample("v-1", "amazon", "es", "20.00", 60 * 30)).unwrap();
    store.append_sample(&sample("v-2", "amazon", "es", "5.00", 60 * 48)).unwrap();

    let mut config = fast_config();
    config.history_window = HistoryWindow::since_hours(24);
    let publisher = Arc::new(RecordingPublisher::default());
    let pw = pipeline(store, vec![], 1, publisher.clone(), config);

    let report = pw.run_aggregation().await.unwrap();
    assert_eq!(report.window, HistoryWindow::since_hours(24));
    assert_eq!(report.groups, 1);
    assert_eq!(
        publisher.prices(),
        vec![("v-1".to_string(), "es".to_string(), dec("30.00"))]
    );
}

#[tokio::test]
async fn test_repeated_cycles_append_history() {
    let store = memory_store();
    let url = "https://www.tradeinn.com/trekkinn/en/boots/1234/p";
    let tradeinn = Arc::new(ScriptedAdapter::new("tradeinn").script(
        url,
        vec![Ok(dec("99.00")), Ok(dec("89.00"))],
    ));
    let publisher = Arc::new(RecordingPublisher::default());
    let pw = pipeline(store.clone(), vec![tradeinn], 1, publisher.clone(), fast_config());
    pw.add_monitored(url, "boot-42", "fr", None).unwrap();

    pw.run_cycle().await.unwrap();
    pw.run_cycle().await.unwrap();

    assert_eq!(store.sample_count().unwrap(), 2);
    let groups = pw.history(&HistoryFilter::default()).unwrap();
    assert_eq!(groups[0].samples[0].price, dec("89.00"));
    assert_eq!(groups[0].samples[1].price, dec("99.00"));
    let last = publisher.published.lock().last().cloned().unwrap();
    assert_eq!(last.price, dec("89.00"));
}

#[tokio::test]
async fn test_cycle_aggregates_only_successful_checks() {
    let store = memory_store();
    let ok_url = "https://www.amazon.es/dp/OK1";
    let bad_url = "https://www.amazon.es/dp/BAD1";
    let amazon = Arc::new(
        ScriptedAdapter::new("amazon")
            .price(ok_url, "19.99")
            .script(bad_url, vec![Err(FetchFailure::Blocked("captcha".into()))]),
    );
    let publisher = Arc::new(RecordingPublisher::default());
    let pw = pipeline(store.clone(), vec![amazon], 3, publisher.clone(), fast_config());
    pw.add_monitored(ok_url, "v1", "r1", None).unwrap();
    pw.add_monitored(bad_url, "v2", "r1", None).unwrap();

    let report = pw.run_cycle().await.unwrap();
    assert_eq!(report.checks.succeeded, 1);
    assert_eq!(report.checks.failed, 1);
    assert_eq!(report.aggregation.groups, 1);
    assert_eq!(
        publisher.prices(),
        vec![("v1".to_string(), "r1".to_string(), dec("19.99"))]
    );
}

#[tokio::test]
async fn test_injected_strategy_decision_failure_is_reported() {
    let store = memory_store();
    store.append_sample(&sample("v-1", "amazon", "es", "10.00", 5)).unwrap();
    store.append_sample(&sample("v-1", "tradeinn", "es", "12.00", 5)).unwrap();
    store.append_sample(&sample("v-2", "amazon", "es", "7.00", 5)).unwrap();

    let publisher = Arc::new(RecordingPublisher::default());
    let pw = PriceWatch::with_collaborators(
        store,
        ProxyPool::new(Vec::new(), ProxyPoolConfig::default()),
        registry(vec![]),
        Arc::new(HighestMultiRetailer),
        publisher.clone(),
        fast_config(),
    );

    let report = pw.run_aggregation().await.unwrap();
    assert_eq!(report.strategy, "highest_multi");
    assert_eq!(report.published, 1);
    assert!(matches!(
        &report.outcomes[1].status,
        GroupStatus::DecisionFailed { error } if error.contains("only 1 retailer")
    ));
    assert_eq!(
        publisher.prices(),
        vec![("v-1".to_string(), "es".to_string(), dec("12.00"))]
    );
}
