//! Bucket and income-level distributions of lending activity.

use std::collections::BTreeMap;

use lending_atlas_analytics_models::{
    AggregateStatistic, BucketShare, ClassificationBucket, ClassificationMetric, Distribution,
    IncomeLevel, IncomeLevelShare, PeriodSummary, SubAreaRecord,
};

use crate::classify::Classification;
use crate::records::TractRecords;

#[derive(Default, Clone, Copy)]
struct Tally {
    tracts: u64,
    count: u64,
    amount: f64,
}

impl Tally {
    fn add(&mut self, record: &SubAreaRecord) {
        self.tracts += 1;
        self.count += record.activity_count();
        self.amount += record.activity_amount();
    }
}

#[allow(clippy::cast_precision_loss)]
fn share_of(part: u64, total: u64) -> AggregateStatistic {
    AggregateStatistic::from_ratio(part as f64, total as f64)
}

/// Activity per bucket of `classification`; every bucket is listed, even
/// when empty.
#[must_use]
pub fn bucket_shares<'a>(
    records: impl IntoIterator<Item = &'a SubAreaRecord>,
    classification: &Classification,
) -> Vec<BucketShare> {
    let mut tallies: BTreeMap<ClassificationBucket, Tally> = BTreeMap::new();
    let mut total = 0;

    for record in records {
        let bucket = classification.bucket(record.sub_area_id(), record.year());
        tallies.entry(bucket).or_default().add(record);
        total += record.activity_count();
    }

    ClassificationBucket::ALL
        .iter()
        .map(|bucket| {
            let tally = tallies.get(bucket).copied().unwrap_or_default();
            BucketShare {
                bucket: *bucket,
                tract_count: tally.tracts,
                activity_count: tally.count,
                activity_amount: tally.amount,
                share: share_of(tally.count, total),
            }
        })
        .collect()
}

/// Activity per FFIEC income level of records carrying the income ratio.
#[must_use]
pub fn income_level_shares<'a>(
    records: impl IntoIterator<Item = &'a SubAreaRecord>,
) -> Vec<IncomeLevelShare> {
    let mut tallies: BTreeMap<IncomeLevel, Tally> = BTreeMap::new();
    let mut total = 0;

    for record in records {
        let level = IncomeLevel::from_ratio(record.metric_value());
        tallies.entry(level).or_default().add(record);
        total += record.activity_count();
    }

    IncomeLevel::ALL
        .iter()
        .map(|level| {
            let tally = tallies.get(level).copied().unwrap_or_default();
            IncomeLevelShare {
                level: *level,
                tract_count: tally.tracts,
                activity_count: tally.count,
                activity_amount: tally.amount,
                share: share_of(tally.count, total),
            }
        })
        .collect()
}

/// Share of activity in low-to-moderate income tracts.
#[must_use]
pub fn lmi_share(levels: &[IncomeLevelShare]) -> AggregateStatistic {
    let total: u64 = levels.iter().map(|l| l.activity_count).sum();
    let lmi: u64 = levels
        .iter()
        .filter(|l| l.level.is_lmi())
        .map(|l| l.activity_count)
        .sum();
    share_of(lmi, total)
}

/// Classified tract activity for one request.
pub struct ClassifiedActivity<'a> {
    /// Parsed tract records.
    pub records: &'a [TractRecords],
    /// Buckets of the minority metric.
    pub minority: &'a Classification,
    /// Buckets of the income metric.
    pub income: &'a Classification,
}

impl ClassifiedActivity<'_> {
    /// Summarizes the records of `year`, or of every year when `None`.
    #[must_use]
    pub fn summarize(&self, year: Option<u16>) -> PeriodSummary {
        let selected: Vec<&TractRecords> = self
            .records
            .iter()
            .filter(|r| year.is_none_or(|y| r.minority.year() == y))
            .collect();

        let income_levels = income_level_shares(selected.iter().map(|r| &r.income));

        PeriodSummary {
            year,
            tract_count: selected.len() as u64,
            activity_count: selected.iter().map(|r| r.minority.activity_count()).sum(),
            activity_amount: selected.iter().map(|r| r.minority.activity_amount()).sum(),
            distributions: vec![
                Distribution {
                    metric: ClassificationMetric::MinorityPct,
                    buckets: bucket_shares(selected.iter().map(|r| &r.minority), self.minority),
                },
                Distribution {
                    metric: ClassificationMetric::IncomeRatio,
                    buckets: bucket_shares(selected.iter().map(|r| &r.income), self.income),
                },
            ],
            lmi_share: lmi_share(&income_levels),
            income_levels,
        }
    }
}
