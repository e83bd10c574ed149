use crate::domain::entities::monitored_product::{MalformedProduct, MonitoredProduct, MonitoredRow};
use crate::domain::entities::price_group::{group_sorted, PriceGroup};
use crate::domain::entities::price_sample::{timestamp_key, PriceSample};
use crate::domain::error::DomainError;
use crate::domain::ports::sample_store::*;
use crate::domain::values::ids::{RegionId, RetailerId, VariantId};
use crate::infrastructure::sqlite::migrations::run_migrations;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
}

type RawSample = (String, String, String, String, String);

impl SqliteSampleStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (or creates) the database at `path`, enables WAL and migrates.
    pub fn open(path: &str) -> Result<Self, DomainError> {
        let conn =
            Connection::open(path).map_err(|e| DomainError::Database(format!("DB error: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| DomainError::Database(format!("WAL error: {e}")))?;
        run_migrations(&conn)?;
        info!(path, "sample store ready");
        Ok(Self::new(conn))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DomainError> {
        self.conn
            .lock()
            .map_err(|e| DomainError::Database(e.to_string()))
    }

    fn canonical<T>(
        column: &str,
        value: Value,
        parse: fn(&str) -> Result<T, DomainError>,
        from_native: fn(i64) -> T,
    ) -> Result<Option<T>, String> {
        match value {
            Value::Null => Ok(None),
            Value::Integer(n) => Ok(Some(from_native(n))),
            Value::Text(s) => parse(&s).map(Some).map_err(|e| format!("{column}: {e}")),
            Value::Real(r) => Err(format!("{column}: unexpected real value {r}")),
            Value::Blob(_) => Err(format!("{column}: unexpected blob value")),
        }
    }

    fn required<T>(column: &str, v: Result<Option<T>, String>) -> Result<T, String> {
        v?.ok_or_else(|| format!("{column}: missing"))
    }

    fn row_to_monitored(
        id: i64,
        url: Option<String>,
        variant: Value,
        retailer: Value,
        region: Value,
    ) -> MonitoredRow {
        let malformed = |reason: String| MalformedProduct {
            row_id: id,
            url: url.clone(),
            reason,
        };
        let url_str = match url.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => return Err(malformed("url: missing".into())),
        };
        let variant_id = Self::required(
            "variant_id",
            Self::canonical("variant_id", variant, VariantId::parse, VariantId::from_native),
        )
        .map_err(&malformed)?;
        let retailer_id =
            Self::canonical("retailer_id", retailer, RetailerId::tag, RetailerId::from_native)
                .map_err(&malformed)?;
        let region_id = Self::required(
            "region_id",
            Self::canonical("region_id", region, RegionId::parse, RegionId::from_native),
        )
        .map_err(&malformed)?;

        Ok(MonitoredProduct {
            id,
            url: url_str,
            variant_id,
            retailer_id,
            region_id,
        })
    }

    fn raw_to_sample(raw: RawSample) -> Result<PriceSample, DomainError> {
        let (variant, retailer, region, price, observed) = raw;
        let price = Decimal::from_str(&price)
            .map_err(|e| DomainError::MalformedRecord(format!("price '{price}': {e}")))?;
        let observed_at = DateTime::parse_from_rfc3339(&observed)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DomainError::MalformedRecord(format!("observed_at '{observed}': {e}")))?;
        Ok(PriceSample {
            variant_id: VariantId::parse(&variant)?,
            retailer_id: RetailerId::parse(&retailer)?,
            region_id: RegionId::parse(&region)?,
            price,
            observed_at,
        })
    }
}

impl SampleStore for SqliteSampleStore {
    fn list_monitored_products(&self) -> Result<Vec<MonitoredRow>, DomainError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, url, variant_id, retailer_id, region_id FROM monitored ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Value>(2)?,
                    row.get::<_, Value>(3)?,
                    row.get::<_, Value>(4)?,
                ))
            })?
            .map(|r| {
                r.map(|(id, url, variant, retailer, region)| {
                    Self::row_to_monitored(id, url, variant, retailer, region)
                })
                .map_err(DomainError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = rows.len(), "listed monitored products");
        Ok(rows)
    }

    fn append_sample(&self, sample: &PriceSample) -> Result<(), DomainError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO price_samples (variant_id, retailer_id, region_id, price, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sample.variant_id.as_str(),
                sample.retailer_id.as_str(),
                sample.region_id.as_str(),
                sample.price.to_string(),
                timestamp_key(&sample.observed_at),
            ],
        )
        .map_err(|e| DomainError::Database(format!("Failed to append sample: {e}")))?;
        Ok(())
    }

    fn visit_price_history(
        &self,
        filter: &HistoryFilter,
        visit: &mut dyn FnMut(PriceGroup) -> Result<(), DomainError>,
    ) -> Result<usize, DomainError> {
        let conn = self.lock()?;
        let mut sql = String::from(
            "SELECT variant_id, retailer_id, region_id, price, observed_at FROM price_samples WHERE 1=1",
        );
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(cutoff) = filter.window.cutoff(Utc::now()) {
            sql.push_str(&format!(" AND observed_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(timestamp_key(&cutoff)));
        }
        if let Some(variant) = &filter.variant_id {
            sql.push_str(&format!(" AND variant_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(variant.to_string()));
        }
        if let Some(region) = &filter.region_id {
            sql.push_str(&format!(" AND region_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(region.to_string()));
        }
        // id DESC: colliding timestamps fall back to insertion order, newest first.
        sql.push_str(" ORDER BY variant_id, region_id, observed_at DESC, id DESC");

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .map(|r| r.map_err(DomainError::from).and_then(Self::raw_to_sample));

        let mut visited = 0;
        for group in group_sorted(rows, filter.window) {
            visit(group?)?;
            visited += 1;
        }
        debug!(groups = visited, window = %filter.window, "grouped price history");
        Ok(visited)
    }

    fn add_monitored(&self, product: &NewMonitored) -> Result<i64, DomainError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO monitored (url, variant_id, retailer_id, region_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                product.url,
                product.variant_id.as_str(),
                product.retailer_id.as_str(),
                product.region_id.as_str(),
            ],
        )
        .map_err(|e| DomainError::Database(format!("Failed to add monitored product: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    fn remove_monitored(&self, id: i64) -> Result<(), DomainError> {
        let conn = self.lock()?;
        let rows = conn
            .execute("DELETE FROM monitored WHERE id = ?1", params![id])
            .map_err(|e| DomainError::Database(format!("Failed to remove monitored product: {e}")))?;
        if rows == 0 {
            return Err(DomainError::NotFound(format!("Monitored product not found: {id}")));
        }
        Ok(())
    }

    fn sample_count(&self) -> Result<usize, DomainError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM price_samples", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}
