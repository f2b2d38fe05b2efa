#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! County demographics from the American Community Survey.
//!
//! [`DemographicSource`] is the collaborator the analytics pipeline uses to
//! weight composites across areas. [`acs::AcsClient`] implements it against
//! the Census Bureau ACS 5-year API, one county per request.

pub mod acs;

use async_trait::async_trait;
use lending_atlas_geography_models::AreaId;
use serde::{Deserialize, Serialize};

pub use acs::{AcsClient, AcsSettings};

/// Errors that can occur while fetching demographics.
#[derive(Debug, thiserror::Error)]
pub enum DemographicError {
    /// HTTP request failed (including timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Census API returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response had no row for the requested county.
    #[error("No ACS {vintage} data for area {area}")]
    NotFound {
        /// Requested county.
        area: AreaId,
        /// Requested survey vintage.
        vintage: u16,
    },

    /// The response did not have the expected shape.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Household count in one income bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeBracketCount {
    /// Bracket label, e.g. `"$10,000 to $14,999"`.
    pub label: String,
    /// Households in the bracket, if reported.
    pub households: Option<u64>,
}

/// Population, race/ethnicity and income figures for one county.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaDemographics {
    /// County the figures describe.
    pub area_id: AreaId,
    /// ACS 5-year vintage (final year of the survey window).
    pub vintage: u16,
    /// Total population.
    pub total_population: Option<u64>,
    /// Population other than non-Hispanic white alone.
    pub minority_population: Option<u64>,
    /// Number of households.
    pub households: Option<u64>,
    /// Median household income in dollars.
    pub median_household_income: Option<u64>,
    /// Household counts per income bracket, lowest bracket first.
    pub income_brackets: Vec<IncomeBracketCount>,
}

impl AreaDemographics {
    /// Minority share of the population as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn minority_pct(&self) -> Option<f64> {
        match (self.minority_population, self.total_population) {
            (Some(minority), Some(total)) if total > 0 => {
                Some(minority as f64 / total as f64 * 100.0)
            }
            _ => None,
        }
    }
}

/// The demographic-data collaborator.
#[async_trait]
pub trait DemographicSource: Send + Sync {
    /// Fetches demographics for one county and survey vintage.
    ///
    /// # Errors
    ///
    /// Returns [`DemographicError`] if the upstream call fails or returns
    /// no data for the county.
    async fn area_demographics(
        &self,
        area: &AreaId,
        vintage: u16,
    ) -> Result<AreaDemographics, DemographicError>;
}
