//! SQL schema of a persisted GSP dataset file.
//!
//! One file holds one labeled array. Values are flattened row-major over the
//! dimensions in `position` order; missing values are stored as NULL.

/// Returns the full SQL schema as a single batch string.
///
/// Tables:
/// - `attributes` - free-form key/value metadata (description, frequency, ...)
/// - `dimensions` - dimension names and sizes, in axis order
/// - `coordinates` - one label per position along each dimension
/// - `site_metadata` - latitude/longitude of sites the lookup knew about
/// - `data_values` - the flattened data variable
pub fn create_schema() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS attributes (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS dimensions (
        position INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        size INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS coordinates (
        dimension TEXT NOT NULL,
        idx INTEGER NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (dimension, idx)
    );

    CREATE TABLE IF NOT EXISTS site_metadata (
        site_id TEXT PRIMARY KEY,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS data_values (
        variable TEXT NOT NULL,
        flat_idx INTEGER NOT NULL,
        value REAL,
        PRIMARY KEY (variable, flat_idx)
    );
    CREATE INDEX IF NOT EXISTS idx_values_variable ON data_values(variable);
    "#
}
