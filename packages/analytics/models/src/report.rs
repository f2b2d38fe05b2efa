//! Request and report types of the analysis pipeline.

use std::collections::BTreeSet;

use lending_atlas_geography_models::{AreaId, GeographySelection};
use lending_atlas_query_models::FilterSet;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::{AggregateStatistic, ClassificationBucket, ClassificationMetric, GroupSummary, IncomeLevel};

/// One analysis request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Geographies to analyze; expanded and unioned into counties.
    pub selections: Vec<GeographySelection>,
    /// Activity years.
    pub years: BTreeSet<u16>,
    /// Application filters.
    #[serde(default)]
    pub filters: FilterSet,
    /// Whether to attach a demographic composite.
    #[serde(default)]
    pub include_demographics: bool,
    /// ACS vintage for the composite; defaults to the latest requested year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics_vintage: Option<u16>,
}

/// A county in the analyzed area set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaSummary {
    /// County code.
    pub area_id: AreaId,
    /// County name, when the hierarchy knows it.
    pub name: Option<String>,
    /// State abbreviation, when known.
    pub state_abbr: Option<String>,
    /// Matching applications in the county across all years.
    pub activity_count: u64,
    /// Total loan amount in the county across all years.
    pub activity_amount: f64,
}

/// Activity falling in one classification bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketShare {
    /// The bucket.
    pub bucket: ClassificationBucket,
    /// Tract-years in the bucket.
    pub tract_count: u64,
    /// Matching applications in the bucket.
    pub activity_count: u64,
    /// Total loan amount in the bucket.
    pub activity_amount: f64,
    /// Bucket activity as a share of all activity.
    pub share: AggregateStatistic,
}

/// Activity falling in one FFIEC income level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeLevelShare {
    /// The level.
    pub level: IncomeLevel,
    /// Tract-years at the level.
    pub tract_count: u64,
    /// Matching applications at the level.
    pub activity_count: u64,
    /// Total loan amount at the level.
    pub activity_amount: f64,
    /// Level activity as a share of all activity.
    pub share: AggregateStatistic,
}

/// Bucket distribution of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    /// Which metric the buckets classify.
    pub metric: ClassificationMetric,
    /// One entry per bucket, in bucket order.
    pub buckets: Vec<BucketShare>,
}

/// Activity summary for one year, or for all years when `year` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    /// The year summarized.
    pub year: Option<u16>,
    /// Tract-years with activity.
    pub tract_count: u64,
    /// Matching applications.
    pub activity_count: u64,
    /// Total loan amount.
    pub activity_amount: f64,
    /// Distributions by classified metric.
    pub distributions: Vec<Distribution>,
    /// Distribution by FFIEC income level.
    pub income_levels: Vec<IncomeLevelShare>,
    /// Share of applications in low-to-moderate income tracts.
    pub lmi_share: AggregateStatistic,
}

/// Households in one income bracket of a composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketShare {
    /// Bracket label (e.g. "$10,000 to $14,999").
    pub label: String,
    /// Households in the bracket across every contributing area.
    pub households: u64,
    /// Bracket households as a share of all reported households.
    pub share: AggregateStatistic,
}

/// Demographics of an area set, built from per-county figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicComposite {
    /// ACS vintage.
    pub vintage: u16,
    /// Counties that contributed.
    pub areas: Vec<AreaId>,
    /// Counties whose figures were unavailable.
    pub missing_areas: Vec<AreaId>,
    /// Summed population.
    pub total_population: u64,
    /// Summed households.
    pub households: u64,
    /// Minority population over total population.
    pub minority_share: AggregateStatistic,
    /// Household-weighted mean of county median household incomes.
    pub median_household_income: Option<f64>,
    /// Summed income bracket counts.
    pub income_brackets: Vec<BracketShare>,
}

/// The upstream dependency an issue came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueSource {
    /// Geographic hierarchy lookups.
    Hierarchy,
    /// Lending record warehouse.
    Warehouse,
    /// Demographic data source.
    Demographics,
}

/// An upstream failure that left the report incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamIssue {
    /// Where the failure happened.
    pub source: IssueSource,
    /// The affected area, if the failure was area-specific.
    pub area: Option<AreaId>,
    /// What went wrong.
    pub message: String,
}

/// Whether every upstream dependency answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completeness {
    /// `true` when `issues` is empty.
    pub complete: bool,
    /// Every upstream failure encountered.
    pub issues: Vec<UpstreamIssue>,
}

impl Default for Completeness {
    fn default() -> Self {
        Self {
            complete: true,
            issues: vec![],
        }
    }
}

impl Completeness {
    /// Records an upstream failure.
    pub fn record(&mut self, source: IssueSource, area: Option<AreaId>, message: impl Into<String>) {
        self.complete = false;
        self.issues.push(UpstreamIssue {
            source,
            area,
            message: message.into(),
        });
    }

    /// Whether no failure was recorded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }
}

/// The result of an analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Counties analyzed.
    pub areas: Vec<AreaSummary>,
    /// Years analyzed.
    pub years: Vec<u16>,
    /// Filters applied, after normalization.
    pub filters: FilterSet,
    /// One summary per requested year.
    pub by_year: Vec<PeriodSummary>,
    /// Summary across every requested year.
    pub overall: PeriodSummary,
    /// Statistics of every classification group.
    pub groups: Vec<GroupSummary>,
    /// Demographic composite, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demographics: Option<DemographicComposite>,
    /// Warehouse rows rejected as malformed.
    pub dropped_records: u64,
    /// Upstream failures, if any.
    pub completeness: Completeness,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_an_issue_marks_incomplete() {
        let mut completeness = Completeness::default();
        assert!(completeness.is_complete());

        completeness.record(IssueSource::Demographics, None, "timed out");
        assert!(!completeness.is_complete());
        assert_eq!(completeness.issues[0].source.to_string(), "demographics");
    }

    #[test]
    fn request_defaults_from_json() {
        let request: AnalysisRequest = serde_json::from_str(
            r#"{"selections":[{"kind":"county","rawIdentifier":"6037"}],"years":[2022]}"#,
        )
        .unwrap();
        assert_eq!(request.filters, FilterSet::default());
        assert!(!request.include_demographics);
        assert_eq!(request.years, [2022].into());
    }
}
