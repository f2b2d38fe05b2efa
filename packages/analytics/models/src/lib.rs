#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Classification, statistic and report types for lending analysis.
//!
//! Buckets produced by the tract classifier are only meaningful inside the
//! group (area set or county, and year) that produced them, so they are
//! always reported next to that group's [`GroupSummary`].

pub mod report;
pub mod statistic;

use lending_atlas_geography_models::{AreaId, TractId};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use report::{
    AnalysisReport, AnalysisRequest, AreaSummary, BracketShare, BucketShare, Completeness,
    DemographicComposite, Distribution, IncomeLevelShare, IssueSource, PeriodSummary, UpstreamIssue,
};
pub use statistic::AggregateStatistic;

/// Ordinal bucket assigned relative to a group's mean and standard
/// deviation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClassificationBucket {
    /// Below μ - σ.
    Low,
    /// From μ - σ up to μ.
    Moderate,
    /// From μ up to μ + σ.
    Middle,
    /// At or above μ + σ.
    Upper,
    /// No metric value, or a degenerate group.
    Unclassified,
}

impl ClassificationBucket {
    /// Every bucket in report order.
    pub const ALL: [Self; 5] = [
        Self::Low,
        Self::Moderate,
        Self::Middle,
        Self::Upper,
        Self::Unclassified,
    ];
}

/// FFIEC tract income level, from the ratio of tract median family income
/// to area median income (in percent).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncomeLevel {
    /// Below 50% of AMI.
    Low,
    /// 50% to below 80% of AMI.
    Moderate,
    /// 80% to below 120% of AMI.
    Middle,
    /// 120% of AMI or more.
    Upper,
    /// Ratio not reported.
    Unknown,
}

impl IncomeLevel {
    /// Every level in report order.
    pub const ALL: [Self; 5] = [
        Self::Low,
        Self::Moderate,
        Self::Middle,
        Self::Upper,
        Self::Unknown,
    ];

    /// Level for an income ratio expressed in percent.
    #[must_use]
    pub fn from_ratio(ratio: Option<f64>) -> Self {
        match ratio {
            Some(r) if r.is_finite() && r >= 0.0 => {
                if r < 50.0 {
                    Self::Low
                } else if r < 80.0 {
                    Self::Moderate
                } else if r < 120.0 {
                    Self::Middle
                } else {
                    Self::Upper
                }
            }
            _ => Self::Unknown,
        }
    }

    /// Whether the level counts as low-to-moderate income.
    #[must_use]
    pub const fn is_lmi(self) -> bool {
        matches!(self, Self::Low | Self::Moderate)
    }
}

/// Tract metric classified with the mean/standard-deviation method.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClassificationMetric {
    /// Minority share of tract population.
    MinorityPct,
    /// Tract median family income as a percentage of AMI.
    IncomeRatio,
}

/// How records are partitioned into peer groups.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GroupBy {
    /// All requested areas pooled, one group per year.
    #[default]
    AreaSetYear,
    /// One group per county per year.
    AreaYear,
}

/// Error returned when a tract does not lie in the area it is filed under.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tract {tract} does not belong to area {area}")]
pub struct RecordError {
    /// The tract.
    pub tract: TractId,
    /// The area it was filed under.
    pub area: AreaId,
}

/// One census tract's metric and lending activity for a year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAreaRecord {
    sub_area_id: TractId,
    area_id: AreaId,
    year: u16,
    metric_value: Option<f64>,
    activity_count: u64,
    activity_amount: f64,
}

impl SubAreaRecord {
    /// Builds a record, checking that the tract lies in `area_id`.
    ///
    /// Non-finite metric values are stored as `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the tract's first five digits are not
    /// `area_id`.
    pub fn new(
        sub_area_id: TractId,
        area_id: AreaId,
        year: u16,
        metric_value: Option<f64>,
        activity_count: u64,
        activity_amount: f64,
    ) -> Result<Self, RecordError> {
        if !sub_area_id.belongs_to(&area_id) {
            return Err(RecordError {
                tract: sub_area_id,
                area: area_id,
            });
        }

        Ok(Self {
            sub_area_id,
            area_id,
            year,
            metric_value: metric_value.filter(|v| v.is_finite()),
            activity_count,
            activity_amount,
        })
    }

    /// The tract.
    #[must_use]
    pub const fn sub_area_id(&self) -> &TractId {
        &self.sub_area_id
    }

    /// The county owning the tract.
    #[must_use]
    pub const fn area_id(&self) -> &AreaId {
        &self.area_id
    }

    /// Activity year.
    #[must_use]
    pub const fn year(&self) -> u16 {
        self.year
    }

    /// The classified metric, if reported.
    #[must_use]
    pub const fn metric_value(&self) -> Option<f64> {
        self.metric_value
    }

    /// Number of matching applications.
    #[must_use]
    pub const fn activity_count(&self) -> u64 {
        self.activity_count
    }

    /// Total loan amount of matching applications.
    #[must_use]
    pub const fn activity_amount(&self) -> f64 {
        self.activity_amount
    }
}

/// Identifies one peer group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKey {
    /// The county, or `None` when all requested areas are pooled.
    pub area: Option<AreaId>,
    /// Activity year.
    pub year: u16,
}

impl GroupKey {
    /// The group `record` falls into under `group_by`.
    #[must_use]
    pub fn for_record(record: &SubAreaRecord, group_by: GroupBy) -> Self {
        Self {
            area: match group_by {
                GroupBy::AreaSetYear => None,
                GroupBy::AreaYear => Some(record.area_id.clone()),
            },
            year: record.year,
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.area {
            Some(area) => write!(f, "{area}/{}", self.year),
            None => write!(f, "all/{}", self.year),
        }
    }
}

/// Bucket boundaries of a group: μ - σ, μ and μ + σ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    /// Values below this are `Low`.
    pub low_below: f64,
    /// Values below this (and not `Low`) are `Moderate`.
    pub moderate_below: f64,
    /// Values below this (and not lower) are `Middle`; the rest `Upper`.
    pub middle_below: f64,
}

/// Statistics of one peer group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Which metric was classified.
    pub metric: ClassificationMetric,
    /// The group.
    pub key: GroupKey,
    /// Records in the group, including those without a value.
    pub records: usize,
    /// Records with a value.
    pub observed: usize,
    /// Mean of observed values.
    pub mean: Option<f64>,
    /// Population standard deviation of observed values.
    pub std_dev: Option<f64>,
    /// Set when σ is zero or fewer than two values were observed; every
    /// record in the group is then `Unclassified`.
    pub degenerate: bool,
    /// Bucket boundaries, absent for degenerate groups.
    pub thresholds: Option<Thresholds>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn income_level_thresholds() {
        assert_eq!(IncomeLevel::from_ratio(Some(49.99)), IncomeLevel::Low);
        assert_eq!(IncomeLevel::from_ratio(Some(50.0)), IncomeLevel::Moderate);
        assert_eq!(IncomeLevel::from_ratio(Some(80.0)), IncomeLevel::Middle);
        assert_eq!(IncomeLevel::from_ratio(Some(119.9)), IncomeLevel::Middle);
        assert_eq!(IncomeLevel::from_ratio(Some(120.0)), IncomeLevel::Upper);
        assert_eq!(IncomeLevel::from_ratio(None), IncomeLevel::Unknown);
        assert_eq!(IncomeLevel::from_ratio(Some(f64::NAN)), IncomeLevel::Unknown);
        assert!(IncomeLevel::Moderate.is_lmi());
        assert!(!IncomeLevel::Middle.is_lmi());
    }

    #[test]
    fn record_enforces_tract_prefix() {
        let tract = TractId::parse("06037101110").unwrap();
        let la = AreaId::parse("06037").unwrap();
        let orange = AreaId::parse("06059").unwrap();

        assert!(SubAreaRecord::new(tract.clone(), la, 2022, Some(10.0), 3, 1.0).is_ok());
        let err = SubAreaRecord::new(tract, orange, 2022, Some(10.0), 3, 1.0).unwrap_err();
        assert_eq!(err.to_string(), "tract 06037101110 does not belong to area 06059");
    }

    #[test]
    fn non_finite_metric_is_none() {
        let record = SubAreaRecord::new(
            TractId::parse("06037101110").unwrap(),
            AreaId::parse("06037").unwrap(),
            2022,
            Some(f64::INFINITY),
            0,
            0.0,
        )
        .unwrap();
        assert_eq!(record.metric_value(), None);
    }

    #[test]
    fn group_key_by_mode() {
        let record = SubAreaRecord::new(
            TractId::parse("06037101110").unwrap(),
            AreaId::parse("06037").unwrap(),
            2021,
            None,
            0,
            0.0,
        )
        .unwrap();
        assert_eq!(
            GroupKey::for_record(&record, GroupBy::AreaSetYear).to_string(),
            "all/2021"
        );
        assert_eq!(
            GroupKey::for_record(&record, GroupBy::AreaYear).to_string(),
            "06037/2021"
        );
        assert_eq!("area_year".parse::<GroupBy>().unwrap(), GroupBy::AreaYear);
    }
}
