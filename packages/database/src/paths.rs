#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the `DuckDB` data directory.
//!
//! The data directory is `$LENDING_ATLAS_DATA_DIR` when set, otherwise
//! `data/` under the current working directory.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LENDING_ATLAS_DATA_DIR";

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV).map_or_else(|| PathBuf::from("data"), PathBuf::from)
}

/// Returns the `data/shared/` directory for shared databases.
#[must_use]
pub fn shared_dir() -> PathBuf {
    data_dir().join("shared")
}

/// Returns the path for the warehouse `DuckDB` file.
#[must_use]
pub fn warehouse_db_path() -> PathBuf {
    shared_dir().join("warehouse.duckdb")
}

/// Returns the `data/cache/` directory for filesystem cache entries.
#[must_use]
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Returns the path for the result cache `DuckDB` file.
#[must_use]
pub fn cache_db_path() -> PathBuf {
    shared_dir().join("result_cache.duckdb")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
