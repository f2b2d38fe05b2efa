//! SQL templates for the fixed analytical shapes.
//!
//! Every shape reads `loan_applications` (alias `l`) and may join the
//! `county_hierarchy` (`h`) and `tract_demographics` (`t`) dimensions. The
//! `WHERE` clause is supplied by the predicate builders. Aggregates are
//! cast to `BIGINT` / `DOUBLE` so result types do not depend on the
//! backend's widening rules.

use lending_atlas_query_models::QueryShape;

/// Column names produced by [`QueryShape::TractActivity`].
pub mod tract_columns {
    /// 11-digit tract code.
    pub const TRACT: &str = "tract_geoid";
    /// 5-digit county code.
    pub const AREA: &str = "area_geoid";
    /// Activity year.
    pub const YEAR: &str = "year";
    /// Number of matching applications.
    pub const COUNT: &str = "activity_count";
    /// Sum of loan amounts.
    pub const AMOUNT: &str = "activity_amount";
    /// Tract minority population percentage.
    pub const MINORITY_PCT: &str = "minority_pct";
    /// Tract median family income as a percentage of area median income.
    pub const INCOME_RATIO: &str = "income_ratio";
    /// Tract population.
    pub const POPULATION: &str = "population";
}

const COUNT_AND_AMOUNT: &str = "CAST(COUNT(*) AS BIGINT) AS activity_count,
       CAST(COALESCE(SUM(l.loan_amount), 0) AS DOUBLE) AS activity_amount";

/// Renders the full SQL for `shape` around an already-built `WHERE` body.
#[must_use]
pub fn render(shape: QueryShape, where_clause: &str) -> String {
    match shape {
        QueryShape::TractActivity => format!(
            "SELECT l.census_tract AS tract_geoid,
       l.county_code AS area_geoid,
       l.activity_year AS year,
       {COUNT_AND_AMOUNT},
       CAST(MAX(t.minority_pct) AS DOUBLE) AS minority_pct,
       CAST(MAX(t.income_ratio) AS DOUBLE) AS income_ratio,
       CAST(MAX(t.population) AS BIGINT) AS population
FROM loan_applications l
LEFT JOIN tract_demographics t
  ON t.tract_geoid = l.census_tract AND t.year = l.activity_year
WHERE l.census_tract IS NOT NULL AND {where_clause}
GROUP BY l.census_tract, l.county_code, l.activity_year
ORDER BY year, tract_geoid"
        ),
        QueryShape::AreaTotals => format!(
            "SELECT l.county_code AS area_geoid,
       MAX(h.county_name) AS area_name,
       l.activity_year AS year,
       {COUNT_AND_AMOUNT}
FROM loan_applications l
LEFT JOIN county_hierarchy h ON h.county_geoid = l.county_code
WHERE {where_clause}
GROUP BY l.county_code, l.activity_year
ORDER BY year, area_geoid"
        ),
        QueryShape::LenderActivity => format!(
            "SELECT l.lei AS lei,
       l.activity_year AS year,
       {COUNT_AND_AMOUNT},
       CAST(COUNT(DISTINCT l.county_code) AS BIGINT) AS area_count
FROM loan_applications l
WHERE {where_clause}
GROUP BY l.lei, l.activity_year
ORDER BY year, activity_count DESC, lei"
        ),
        QueryShape::BorrowerRace => format!(
            "SELECT COALESCE(l.derived_race, 'Not Available') AS derived_race,
       COALESCE(l.derived_ethnicity, 'Not Available') AS derived_ethnicity,
       l.activity_year AS year,
       {COUNT_AND_AMOUNT}
FROM loan_applications l
WHERE {where_clause}
GROUP BY 1, 2, l.activity_year
ORDER BY year, derived_race, derived_ethnicity"
        ),
    }
}
