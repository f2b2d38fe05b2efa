//! Aggregate statistics that keep their components.

use serde::{Deserialize, Serialize};

/// A ratio reported together with the sums it was computed from.
///
/// Keeping the numerator and denominator lets callers recombine statistics
/// across areas without reintroducing the error of averaging averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStatistic {
    numerator_sum: f64,
    denominator_sum: f64,
    percentage: Option<f64>,
}

impl AggregateStatistic {
    /// `numerator / denominator * 100`, or no percentage when the
    /// denominator is zero.
    #[must_use]
    pub fn from_ratio(numerator_sum: f64, denominator_sum: f64) -> Self {
        let percentage = if denominator_sum == 0.0 {
            None
        } else {
            Some(numerator_sum / denominator_sum * 100.0)
        };

        Self {
            numerator_sum,
            denominator_sum,
            percentage,
        }
    }

    /// A weighted mean of percentages: `weighted_sum` is Σ(pᵢ·wᵢ) and
    /// `weight_sum` is Σwᵢ.
    #[must_use]
    pub fn from_weighted(weighted_sum: f64, weight_sum: f64) -> Self {
        let percentage = if weight_sum == 0.0 {
            None
        } else {
            Some(weighted_sum / weight_sum)
        };

        Self {
            numerator_sum: weighted_sum,
            denominator_sum: weight_sum,
            percentage,
        }
    }

    /// Sum of numerators.
    #[must_use]
    pub const fn numerator_sum(&self) -> f64 {
        self.numerator_sum
    }

    /// Sum of denominators.
    #[must_use]
    pub const fn denominator_sum(&self) -> f64 {
        self.denominator_sum
    }

    /// The percentage, absent when the denominator is zero.
    #[must_use]
    pub const fn percentage(&self) -> Option<f64> {
        self.percentage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_scales_to_percent() {
        let stat = AggregateStatistic::from_ratio(25.0, 200.0);
        assert_eq!(stat.percentage(), Some(12.5));
        assert_eq!(stat.numerator_sum(), 25.0);
        assert_eq!(stat.denominator_sum(), 200.0);
    }

    #[test]
    fn zero_denominator_has_no_percentage() {
        assert_eq!(AggregateStatistic::from_ratio(0.0, 0.0).percentage(), None);
        assert_eq!(AggregateStatistic::from_weighted(5.0, 0.0).percentage(), None);
    }

    #[test]
    fn serializes_null_percentage() {
        let json = serde_json::to_string(&AggregateStatistic::from_ratio(1.0, 0.0)).unwrap();
        assert_eq!(
            json,
            r#"{"numeratorSum":1.0,"denominatorSum":0.0,"percentage":null}"#
        );
    }
}
