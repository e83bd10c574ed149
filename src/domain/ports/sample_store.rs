use crate::domain::entities::monitored_product::MonitoredRow;
use crate::domain::entities::price_group::PriceGroup;
use crate::domain::entities::price_sample::PriceSample;
use crate::domain::error::DomainError;
use crate::domain::values::history_window::HistoryWindow;
use crate::domain::values::ids::{RegionId, RetailerId, VariantId};

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub window: HistoryWindow,
    pub variant_id: Option<VariantId>,
    pub region_id: Option<RegionId>,
}

impl HistoryFilter {
    pub fn window(window: HistoryWindow) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMonitored {
    pub url: String,
    pub variant_id: VariantId,
    pub retailer_id: RetailerId,
    pub region_id: RegionId,
}

/// Persistence for monitored products and price samples.
///
/// Samples are append-only; nothing here updates or deletes one.
pub trait SampleStore: Send + Sync {
    /// Point-in-time snapshot of the monitored set. Rows that cannot be read
    /// into canonical identifiers come back as `Err` entries; a store-level
    /// failure fails the whole call.
    fn list_monitored_products(&self) -> Result<Vec<MonitoredRow>, DomainError>;

    fn append_sample(&self, sample: &PriceSample) -> Result<(), DomainError>;

    /// Streams one group per distinct (variant, region), samples newest
    /// first, handing each to `visit` as soon as it is complete. Returns the
    /// number of groups visited. An error from `visit` stops the scan.
    fn visit_price_history(
        &self,
        filter: &HistoryFilter,
        visit: &mut dyn FnMut(PriceGroup) -> Result<(), DomainError>,
    ) -> Result<usize, DomainError>;

    /// [`visit_price_history`](Self::visit_price_history) collected into a
    /// point-in-time snapshot.
    fn grouped_price_history(&self, filter: &HistoryFilter) -> Result<Vec<PriceGroup>, DomainError> {
        let mut groups = Vec::new();
        self.visit_price_history(filter, &mut |group| {
            groups.push(group);
            Ok(())
        })?;
        Ok(groups)
    }

    fn add_monitored(&self, product: &NewMonitored) -> Result<i64, DomainError>;
    fn remove_monitored(&self, id: i64) -> Result<(), DomainError>;
    fn sample_count(&self) -> Result<usize, DomainError>;
}
