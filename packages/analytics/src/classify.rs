//! Mean/standard-deviation classification of tracts against their peers.

use std::collections::BTreeMap;

use lending_atlas_analytics_models::{
    ClassificationBucket, ClassificationMetric, GroupBy, GroupKey, GroupSummary, SubAreaRecord,
    Thresholds,
};
use lending_atlas_geography_models::TractId;

/// Buckets and group statistics produced by [`TractClassifier::classify`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Bucket per tract and year.
    pub buckets: BTreeMap<(TractId, u16), ClassificationBucket>,
    /// One summary per group, ordered by group key.
    pub groups: Vec<GroupSummary>,
}

impl Classification {
    /// The bucket assigned to `tract` in `year`, `Unclassified` if the
    /// record was never seen.
    #[must_use]
    pub fn bucket(&self, tract: &TractId, year: u16) -> ClassificationBucket {
        self.buckets
            .get(&(tract.clone(), year))
            .copied()
            .unwrap_or(ClassificationBucket::Unclassified)
    }
}

/// Assigns ordinal buckets relative to each group's μ and σ.
///
/// Groups with σ = 0, or with fewer than two observed values, are
/// degenerate: every record in them is `Unclassified`.
#[derive(Debug, Clone, Copy)]
pub struct TractClassifier {
    metric: ClassificationMetric,
    group_by: GroupBy,
}

impl TractClassifier {
    /// Creates a classifier for `metric`, grouping records by `group_by`.
    #[must_use]
    pub const fn new(metric: ClassificationMetric, group_by: GroupBy) -> Self {
        Self { metric, group_by }
    }

    /// The metric being classified.
    #[must_use]
    pub const fn metric(&self) -> ClassificationMetric {
        self.metric
    }

    /// Classifies every record.
    #[must_use]
    pub fn classify(&self, records: &[SubAreaRecord]) -> Classification {
        let mut groups: BTreeMap<GroupKey, Vec<&SubAreaRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry(GroupKey::for_record(record, self.group_by))
                .or_default()
                .push(record);
        }

        let mut classification = Classification::default();

        for (key, members) in groups {
            let summary = self.summarize(key, &members);

            for record in &members {
                let bucket = match (summary.thresholds, record.metric_value()) {
                    (Some(thresholds), Some(value)) => bucket_for(value, &thresholds),
                    _ => ClassificationBucket::Unclassified,
                };
                classification
                    .buckets
                    .insert((record.sub_area_id().clone(), record.year()), bucket);
            }

            if summary.degenerate {
                log::debug!(
                    "Group {} ({}) is degenerate: {} observed values, sigma {:?}",
                    summary.key,
                    self.metric,
                    summary.observed,
                    summary.std_dev,
                );
            }
            classification.groups.push(summary);
        }

        classification
    }

    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    fn summarize(&self, key: GroupKey, members: &[&SubAreaRecord]) -> GroupSummary {
        let values: Vec<f64> = members.iter().filter_map(|r| r.metric_value()).collect();
        let n = values.len();

        // Identical values are compared directly: their float mean can be
        // off by an ulp, leaving a tiny nonzero sigma.
        let identical = values.windows(2).all(|pair| pair[0] == pair[1]);

        let (mean, std_dev) = if n == 0 {
            (None, None)
        } else if identical {
            (Some(values[0]), Some(0.0))
        } else {
            let mean = values.iter().sum::<f64>() / n as f64;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            (Some(mean), Some(variance.sqrt()))
        };

        let thresholds = match (mean, std_dev) {
            (Some(mean), Some(sigma)) if n >= 2 && !identical && sigma > 0.0 => Some(Thresholds {
                low_below: mean - sigma,
                moderate_below: mean,
                middle_below: mean + sigma,
            }),
            _ => None,
        };

        GroupSummary {
            metric: self.metric,
            key,
            records: members.len(),
            observed: n,
            mean,
            std_dev,
            degenerate: thresholds.is_none(),
            thresholds,
        }
    }
}

fn bucket_for(value: f64, thresholds: &Thresholds) -> ClassificationBucket {
    if value < thresholds.low_below {
        ClassificationBucket::Low
    } else if value < thresholds.moderate_below {
        ClassificationBucket::Moderate
    } else if value < thresholds.middle_below {
        ClassificationBucket::Middle
    } else {
        ClassificationBucket::Upper
    }
}
