//! Combining per-area ratios into geography-level composites.
//!
//! Ratios are always combined from their sums: numerators and
//! denominators are added before dividing, so large and small areas
//! contribute in proportion to their size.

use lending_atlas_analytics_models::AggregateStatistic;
use lending_atlas_geography_models::AreaId;

use crate::AnalyticsError;

/// One area's contribution to a ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaRatio {
    /// The contributing county.
    pub area_id: AreaId,
    /// Numerator (e.g. minority population).
    pub numerator: f64,
    /// Denominator (e.g. total population).
    pub denominator: f64,
}

/// Sums numerators and denominators across areas and divides once.
#[must_use]
pub fn aggregate(statistics: &[AreaRatio]) -> AggregateStatistic {
    let (numerator, denominator) = statistics
        .iter()
        .fold((0.0, 0.0), |(n, d), s| (n + s.numerator, d + s.denominator));
    AggregateStatistic::from_ratio(numerator, denominator)
}

/// Weights each area's percentage: `Σ(pᵢ·wᵢ) / Σwᵢ`.
///
/// Areas with no percentage are skipped and their weight is not counted.
///
/// The pipeline pools raw counts through [`aggregate`] instead; this is for
/// callers re-weighting per-area results they already hold, such as
/// county shares weighted by each county's activity count.
///
/// # Errors
///
/// Returns [`AnalyticsError::LengthMismatch`] if `area_results` and
/// `weights` differ in length.
pub fn combine(
    area_results: &[AggregateStatistic],
    weights: &[f64],
) -> Result<AggregateStatistic, AnalyticsError> {
    if area_results.len() != weights.len() {
        return Err(AnalyticsError::LengthMismatch {
            values: area_results.len(),
            weights: weights.len(),
        });
    }

    let (weighted, total) = area_results
        .iter()
        .zip(weights)
        .filter_map(|(stat, w)| stat.percentage().map(|p| (p, *w)))
        .fold((0.0, 0.0), |(sum, total), (p, w)| (p.mul_add(w, sum), total + w));

    Ok(AggregateStatistic::from_weighted(weighted, total))
}

/// `Σ(vᵢ·wᵢ) / Σwᵢ`, or `None` when the weights sum to zero.
///
/// # Errors
///
/// Returns [`AnalyticsError::LengthMismatch`] if the slices differ in
/// length.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Result<Option<f64>, AnalyticsError> {
    if values.len() != weights.len() {
        return Err(AnalyticsError::LengthMismatch {
            values: values.len(),
            weights: weights.len(),
        });
    }

    Ok(AggregateStatistic::from_weighted(
        values.iter().zip(weights).map(|(v, w)| v * w).sum(),
        weights.iter().sum(),
    )
    .percentage())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(area: &str, numerator: f64, denominator: f64) -> AreaRatio {
        AreaRatio {
            area_id: AreaId::parse(area).unwrap(),
            numerator,
            denominator,
        }
    }

    #[test]
    fn sums_before_dividing() {
        // 1/10 and 90/100 average to 50% but pool to 91/110.
        let stat = aggregate(&[ratio("09001", 1.0, 10.0), ratio("09009", 90.0, 100.0)]);
        assert_eq!(stat.numerator_sum(), 91.0);
        assert_eq!(stat.denominator_sum(), 110.0);
        assert!((stat.percentage().unwrap() - 82.727_272).abs() < 1e-5);
    }

    #[test]
    fn zero_denominator_is_null() {
        let stat = aggregate(&[ratio("09001", 5.0, 0.0)]);
        assert_eq!(stat.numerator_sum(), 5.0);
        assert_eq!(stat.percentage(), None);
        assert_eq!(aggregate(&[]).percentage(), None);
    }

    #[test]
    fn weighted_combination() {
        let stat = combine(
            &[
                AggregateStatistic::from_ratio(10.0, 100.0),
                AggregateStatistic::from_ratio(60.0, 300.0),
            ],
            &[100.0, 300.0],
        )
        .unwrap();
        assert_eq!(stat.percentage(), Some(17.5));
        assert_eq!(stat.denominator_sum(), 400.0);
    }

    #[test]
    fn null_percentages_do_not_dilute() {
        let stat = combine(
            &[
                AggregateStatistic::from_ratio(10.0, 100.0),
                AggregateStatistic::from_ratio(3.0, 0.0),
            ],
            &[100.0, 900.0],
        )
        .unwrap();
        assert_eq!(stat.percentage(), Some(10.0));
        assert_eq!(stat.denominator_sum(), 100.0);
    }

    #[test]
    fn mismatched_lengths_fail() {
        assert_eq!(
            combine(&[AggregateStatistic::from_ratio(1.0, 2.0)], &[]),
            Err(AnalyticsError::LengthMismatch {
                values: 1,
                weights: 0
            })
        );
        assert!(weighted_mean(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn weighted_mean_of_zero_weights_is_none() {
        assert_eq!(weighted_mean(&[50_000.0, 70_000.0], &[0.0, 0.0]), Ok(None));
        assert_eq!(
            weighted_mean(&[50_000.0, 70_000.0], &[1.0, 3.0]),
            Ok(Some(65_000.0))
        );
    }
}
