use crate::domain::entities::price_sample::PriceSample;
use crate::domain::error::DomainError;
use crate::domain::values::history_window::HistoryWindow;
use crate::domain::values::ids::{RegionId, RetailerId, VariantId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedSample {
    pub retailer_id: RetailerId,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Every sample for one (variant, region) across all retailers, newest first.
///
/// Derived on read, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceGroup {
    pub variant_id: VariantId,
    pub region_id: RegionId,
    pub samples: Vec<GroupedSample>,
}

impl PriceGroup {
    pub fn is_newest_first(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[0].observed_at >= w[1].observed_at)
    }

    /// Newest sample of each retailer, in newest-first order.
    pub fn latest_per_retailer(&self) -> Vec<&GroupedSample> {
        let mut seen = HashSet::new();
        self.samples
            .iter()
            .filter(|s| seen.insert(&s.retailer_id))
            .collect()
    }
}

/// Folds a sample stream sorted by `(variant, region, observed_at DESC)` into
/// groups, one group at a time.
pub struct GroupSorted<I: Iterator> {
    rows: std::iter::Peekable<I>,
    window: HistoryWindow,
}

pub fn group_sorted<I>(rows: I, window: HistoryWindow) -> GroupSorted<I>
where
    I: Iterator<Item = Result<PriceSample, DomainError>>,
{
    GroupSorted {
        rows: rows.peekable(),
        window,
    }
}

impl<I> Iterator for GroupSorted<I>
where
    I: Iterator<Item = Result<PriceSample, DomainError>>,
{
    type Item = Result<PriceGroup, DomainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.rows.next()? {
            Ok(s) => s,
            Err(e) => return Some(Err(e)),
        };

        let mut seen = HashSet::new();
        let keep_latest_only = self.window == HistoryWindow::LatestPerRetailer;
        seen.insert(first.retailer_id.clone());

        let mut group = PriceGroup {
            variant_id: first.variant_id,
            region_id: first.region_id,
            samples: vec![GroupedSample {
                retailer_id: first.retailer_id,
                price: first.price,
                observed_at: first.observed_at,
            }],
        };

        loop {
            let same_key = match self.rows.peek() {
                Some(Ok(next)) => {
                    next.variant_id == group.variant_id && next.region_id == group.region_id
                }
                Some(Err(_)) => true,
                None => false,
            };
            if !same_key {
                break;
            }
            let sample = match self.rows.next() {
                Some(Ok(s)) => s,
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            };
            if keep_latest_only && !seen.insert(sample.retailer_id.clone()) {
                continue;
            }
            group.samples.push(GroupedSample {
                retailer_id: sample.retailer_id,
                price: sample.price,
                observed_at: sample.observed_at,
            });
        }

        Some(Ok(group))
    }
}
