//! Demographic composites over a set of counties.

use lending_atlas_analytics_models::{AggregateStatistic, BracketShare, DemographicComposite};
use lending_atlas_census::AreaDemographics;
use lending_atlas_geography_models::AreaId;

use crate::aggregate::{AreaRatio, aggregate, weighted_mean};

/// Builds the composite of `figures`.
///
/// The minority share pools population counts; median household income
/// is the household-weighted mean of county medians; bracket shares pool
/// household counts. Counties missing a figure are left out of that
/// figure only.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn composite_demographics(
    vintage: u16,
    figures: &[AreaDemographics],
    missing_areas: Vec<AreaId>,
) -> DemographicComposite {
    let minority_share = aggregate(
        &figures
            .iter()
            .filter_map(|f| match (f.minority_population, f.total_population) {
                (Some(minority), Some(total)) => Some(AreaRatio {
                    area_id: f.area_id.clone(),
                    numerator: minority as f64,
                    denominator: total as f64,
                }),
                _ => None,
            })
            .collect::<Vec<_>>(),
    );

    let (incomes, weights): (Vec<f64>, Vec<f64>) = figures
        .iter()
        .filter_map(|f| match (f.median_household_income, f.households) {
            (Some(income), Some(households)) => Some((income as f64, households as f64)),
            _ => None,
        })
        .unzip();
    let median_household_income = weighted_mean(&incomes, &weights).unwrap_or_else(|e| {
        log::warn!("Could not weight median incomes: {e}");
        None
    });

    DemographicComposite {
        vintage,
        areas: figures.iter().map(|f| f.area_id.clone()).collect(),
        missing_areas,
        total_population: figures.iter().filter_map(|f| f.total_population).sum(),
        households: figures.iter().filter_map(|f| f.households).sum(),
        minority_share,
        median_household_income,
        income_brackets: bracket_shares(figures),
    }
}

#[allow(clippy::cast_precision_loss)]
fn bracket_shares(figures: &[AreaDemographics]) -> Vec<BracketShare> {
    let mut totals: Vec<(String, u64)> = vec![];

    for figure in figures {
        for (i, bracket) in figure.income_brackets.iter().enumerate() {
            if totals.len() <= i {
                totals.push((bracket.label.clone(), 0));
            }
            totals[i].1 += bracket.households.unwrap_or(0);
        }
    }

    let all: u64 = totals.iter().map(|(_, n)| n).sum();

    totals
        .into_iter()
        .map(|(label, households)| BracketShare {
            label,
            households,
            share: AggregateStatistic::from_ratio(households as f64, all as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use lending_atlas_census::IncomeBracketCount;

    use super::*;

    fn county(area: &str, total: u64, minority: u64, households: u64, income: u64) -> AreaDemographics {
        AreaDemographics {
            area_id: AreaId::parse(area).unwrap(),
            vintage: 2022,
            total_population: Some(total),
            minority_population: Some(minority),
            households: Some(households),
            median_household_income: Some(income),
            income_brackets: vec![
                IncomeBracketCount {
                    label: "Less than $10,000".to_string(),
                    households: Some(households / 4),
                },
                IncomeBracketCount {
                    label: "$200,000 or more".to_string(),
                    households: Some(households - households / 4),
                },
            ],
        }
    }

    #[test]
    fn single_county_composite_matches_the_county() {
        let fairfield = county("09001", 957_419, 383_000, 356_000, 106_000);

        let composite = composite_demographics(2022, std::slice::from_ref(&fairfield), vec![]);

        assert_eq!(composite.total_population, 957_419);
        assert_eq!(composite.households, 356_000);
        assert_eq!(composite.minority_share.percentage(), fairfield.minority_pct());
        assert_eq!(composite.median_household_income, Some(106_000.0));
        assert_eq!(composite.income_brackets[0].households, 89_000);
        assert_eq!(composite.income_brackets[0].share.percentage(), Some(25.0));
    }

    #[test]
    fn pools_counts_and_weights_by_households() {
        let composite = composite_demographics(
            2022,
            &[
                county("09001", 1_000, 100, 100, 50_000),
                county("09009", 3_000, 1_500, 300, 90_000),
            ],
            vec![AreaId::parse("09005").unwrap()],
        );

        assert_eq!(composite.minority_share.percentage(), Some(40.0));
        assert_eq!(composite.median_household_income, Some(80_000.0));
        assert_eq!(composite.areas.len(), 2);
        assert_eq!(composite.missing_areas.len(), 1);
    }

    #[test]
    fn missing_figures_leave_nulls() {
        let mut figure = county("09001", 0, 0, 0, 0);
        figure.median_household_income = None;

        let composite = composite_demographics(2022, &[figure], vec![]);

        assert_eq!(composite.minority_share.percentage(), None);
        assert_eq!(composite.median_household_income, None);
    }
}
