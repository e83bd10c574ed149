use crate::domain::error::DomainError;
use rusqlite::Connection;

/// Identifier columns of `monitored` are deliberately untyped: catalog
/// imports may write native integers or text, and the store canonicalizes
/// them on read.
pub fn run_migrations(conn: &Connection) -> Result<(), DomainError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS monitored (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            variant_id,
            retailer_id,
            region_id,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS price_samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            variant_id TEXT NOT NULL,
            retailer_id TEXT NOT NULL,
            region_id TEXT NOT NULL,
            price TEXT NOT NULL,
            observed_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_samples_group
            ON price_samples(variant_id, region_id, observed_at DESC);
        CREATE INDEX IF NOT EXISTS idx_samples_observed ON price_samples(observed_at);
        ",
    )
    .map_err(|e| DomainError::Database(format!("Migration failed: {e}")))
}
