//! Warehouse connection setup and schema.

use std::path::Path;

use duckdb::Connection;

use crate::DbError;

/// Connection tuning applied to every opened warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// `DuckDB` worker threads.
    pub threads: u32,
    /// `DuckDB` memory limit, e.g. `"512MB"`.
    pub memory_limit: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            threads: 4,
            memory_limit: "512MB".to_string(),
        }
    }
}

/// Opens (or creates) the warehouse `DuckDB` and ensures its schema.
///
/// # Errors
///
/// Returns [`DbError`] if the directory, connection or schema creation
/// fails.
pub fn open(path: &Path, settings: &ConnectionSettings) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    configure(&conn, settings)?;
    ensure_schema(&conn)?;

    log::debug!("Opened warehouse at {}", path.display());

    Ok(conn)
}

/// Opens the warehouse at the default path.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<Connection, DbError> {
    open(
        &crate::paths::warehouse_db_path(),
        &ConnectionSettings::default(),
    )
}

/// Opens an in-memory warehouse with the schema in place.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    ensure_schema(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection, settings: &ConnectionSettings) -> Result<(), DbError> {
    // SET does not accept bound parameters; keep only alphanumerics.
    let memory_limit: String = settings
        .memory_limit
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    conn.execute_batch(&format!(
        "SET threads = {}; SET memory_limit = '{memory_limit}';",
        settings.threads.max(1)
    ))?;
    Ok(())
}

/// Creates the fact and dimension tables when missing.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn ensure_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS loan_applications (
            activity_year INTEGER NOT NULL,
            lei TEXT NOT NULL,
            county_code TEXT,
            census_tract TEXT,
            loan_purpose INTEGER,
            action_taken INTEGER,
            occupancy_type INTEGER,
            loan_type INTEGER,
            loan_amount DOUBLE,
            reverse_mortgage INTEGER,
            open_end_line_of_credit INTEGER,
            business_or_commercial_purpose INTEGER,
            total_units INTEGER,
            derived_race TEXT,
            derived_ethnicity TEXT
        );

        CREATE TABLE IF NOT EXISTS county_hierarchy (
            county_geoid TEXT PRIMARY KEY,
            county_name TEXT NOT NULL,
            state_fips TEXT NOT NULL,
            state_abbr TEXT,
            cbsa_code TEXT,
            cbsa_title TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_county_hierarchy_state
            ON county_hierarchy (state_fips);
        CREATE INDEX IF NOT EXISTS idx_county_hierarchy_cbsa
            ON county_hierarchy (cbsa_code);

        CREATE TABLE IF NOT EXISTS tract_demographics (
            tract_geoid TEXT NOT NULL,
            year INTEGER NOT NULL,
            minority_pct DOUBLE,
            income_ratio DOUBLE,
            population BIGINT,
            PRIMARY KEY (tract_geoid, year)
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables
                 WHERE table_name IN ('loan_applications', 'county_hierarchy', 'tract_demographics')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn open_on_disk_creates_parent_dir() {
        let dir = std::env::temp_dir().join("lending_atlas_schema_test");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("warehouse.duckdb");

        let conn = open(&path, &ConnectionSettings::default()).unwrap();
        drop(conn);

        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
