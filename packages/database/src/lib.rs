#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` storage for the lending analytics workspace.
//!
//! Holds the canonical data-directory layout, the warehouse schema (the
//! `loan_applications` fact table and its `county_hierarchy` and
//! `tract_demographics` dimensions) and [`warehouse::DuckDbWarehouse`],
//! the [`warehouse::Warehouse`] implementation that executes bound queries.

pub mod paths;
pub mod schema;
pub mod warehouse;

/// Errors that can occur while opening or preparing a database.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the analytical warehouse.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// The query did not finish within the configured timeout.
    #[error("Warehouse query timed out after {seconds}s")]
    Timeout {
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// The backend failed outside of query execution.
    #[error("Warehouse backend error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },

    /// `DuckDB` error while preparing or running the query.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),
}
