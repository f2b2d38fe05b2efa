#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tract classification, weighted aggregation and the analysis pipeline.
//!
//! [`AnalysisPipeline`] resolves geography selections into counties,
//! composes a tract-level activity query, classifies the returned tracts
//! against their peers and aggregates the result into an
//! [`AnalysisReport`](lending_atlas_analytics_models::AnalysisReport). The
//! whole sequence runs behind the result cache.

pub mod aggregate;
pub mod classify;
pub mod demographics;
pub mod distribution;
pub mod pipeline;
pub mod records;

use lending_atlas_query::QueryError;

pub use classify::{Classification, TractClassifier};
pub use pipeline::AnalysisPipeline;

/// Errors that can occur during analysis.
///
/// Upstream outages are not errors: they are recorded in the report's
/// completeness marker instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyticsError {
    /// The request is malformed, unresolvable or too large.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// Values and weights passed to a weighted combination differ in
    /// length.
    #[error("Length mismatch: {values} values but {weights} weights")]
    LengthMismatch {
        /// Number of values.
        values: usize,
        /// Number of weights.
        weights: usize,
    },
}

impl AnalyticsError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<QueryError> for AnalyticsError {
    fn from(value: QueryError) -> Self {
        match value {
            QueryError::Validation { message } => Self::Validation { message },
        }
    }
}
