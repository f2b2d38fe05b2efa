#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geography selection resolution.
//!
//! [`resolver::GeoidResolver`] expands a user's county, state, metro or
//! planning-region selection into a deduplicated set of canonical county
//! codes. State and metro membership comes from an [`AreaHierarchy`]
//! collaborator; [`hierarchy_db::DuckDbHierarchy`] is the `DuckDB`-backed
//! implementation, populated by the [`ingest`] functions from the Census
//! Bureau `TIGERweb` service and CBSA delineation files.

pub mod hierarchy_db;
pub mod ingest;
pub mod memory;
pub mod planning_regions;
pub mod resolver;

use std::collections::BTreeSet;

use async_trait::async_trait;
use lending_atlas_geography_models::{AreaId, CountyInfo, IdentifierError};
use thiserror::Error;

pub use resolver::GeoidResolver;

/// Errors that can occur during geography operations.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The selection is malformed or does not resolve to any area.
    #[error("Invalid selection {selection}: {reason}")]
    Validation {
        /// The selection as the user supplied it.
        selection: String,
        /// Why it could not be resolved.
        reason: String,
    },

    /// The hierarchy collaborator failed.
    #[error("Hierarchy lookup failed: {message}")]
    Hierarchy {
        /// Description of what went wrong.
        message: String,
    },

    /// `DuckDB` operation failed.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Opening the hierarchy database failed.
    #[error("Database setup error: {0}")]
    DatabaseSetup(#[from] lending_atlas_database::DbError),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An identifier read from an external source was malformed.
    #[error("Identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

impl GeoError {
    /// Whether this error was caused by the caller's input rather than an
    /// upstream failure.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// The geography hierarchy collaborator.
///
/// County membership of states and metro areas does not vary by year, so
/// one answer can be reused across a multi-year request.
#[async_trait]
pub trait AreaHierarchy: Send + Sync {
    /// All county codes in the state with the given two-digit FIPS code.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the backing store cannot be read.
    async fn counties_in_state(&self, state_fips: &str) -> Result<BTreeSet<AreaId>, GeoError>;

    /// All county codes in the core-based statistical area `cbsa_code`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the backing store cannot be read.
    async fn counties_in_metro(&self, cbsa_code: &str) -> Result<BTreeSet<AreaId>, GeoError>;

    /// Display name and parent codes of a county, if known.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the backing store cannot be read.
    async fn county_info(&self, area: &AreaId) -> Result<Option<CountyInfo>, GeoError>;
}
