//! The query composer and its input limits.

use std::collections::BTreeSet;

use lending_atlas_geography_models::AreaId;
use lending_atlas_query_models::{BoundQuery, FilterSet, QueryShape};

use crate::QueryError;
use crate::predicates::{ParamBinder, PredicateContext, build_predicates};
use crate::shapes;

/// Earliest activity year accepted.
pub const MIN_YEAR: u16 = 2007;
/// Latest activity year accepted.
pub const MAX_YEAR: u16 = 2100;
/// Length of a legal entity identifier.
pub const LEI_LENGTH: usize = 20;

/// Upper bounds on request size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposerLimits {
    /// Maximum number of distinct areas per query.
    pub max_areas: usize,
    /// Maximum number of distinct years per query.
    pub max_years: usize,
}

impl Default for ComposerLimits {
    fn default() -> Self {
        Self {
            max_areas: 500,
            max_years: 10,
        }
    }
}

/// Builds parameter-bound analytical queries.
#[derive(Debug, Clone, Default)]
pub struct QueryComposer {
    limits: ComposerLimits,
}

impl QueryComposer {
    /// Creates a composer with the given limits.
    #[must_use]
    pub const fn new(limits: ComposerLimits) -> Self {
        Self { limits }
    }

    /// The limits this composer enforces.
    #[must_use]
    pub const fn limits(&self) -> ComposerLimits {
        self.limits
    }

    /// Checks the area and year counts against the configured limits.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] if either set is empty or larger
    /// than its limit.
    pub fn check_limits(&self, area_count: usize, year_count: usize) -> Result<(), QueryError> {
        if area_count == 0 {
            return Err(QueryError::validation("at least one area is required"));
        }
        if year_count == 0 {
            return Err(QueryError::validation("at least one year is required"));
        }
        if area_count > self.limits.max_areas {
            return Err(QueryError::validation(format!(
                "too many areas: limit is {}, received {area_count}",
                self.limits.max_areas
            )));
        }
        if year_count > self.limits.max_years {
            return Err(QueryError::validation(format!(
                "too many years: limit is {}, received {year_count}",
                self.limits.max_years
            )));
        }
        Ok(())
    }

    /// Validates a complete request without composing any SQL.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] on limit violations, years outside
    /// the supported range, or malformed lender identifiers.
    pub fn validate(
        &self,
        areas: &BTreeSet<AreaId>,
        years: &BTreeSet<u16>,
        filters: &FilterSet,
    ) -> Result<(), QueryError> {
        self.check_limits(areas.len(), years.len())?;

        if let Some(year) = years.iter().find(|y| !(MIN_YEAR..=MAX_YEAR).contains(*y)) {
            return Err(QueryError::validation(format!(
                "year {year} is outside {MIN_YEAR}..={MAX_YEAR}"
            )));
        }

        if let Some(ids) = &filters.lender_ids
            && let Some(bad) = ids.iter().map(|id| id.trim()).find(|id| !is_valid_lei(id))
        {
            return Err(QueryError::validation(format!(
                "lender identifier '{bad}' must be {LEI_LENGTH} alphanumeric characters"
            )));
        }

        Ok(())
    }

    /// Composes `shape` for the given areas, years and filters.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] if the request fails
    /// [`Self::validate`].
    pub fn compose(
        &self,
        shape: QueryShape,
        areas: &BTreeSet<AreaId>,
        years: &BTreeSet<u16>,
        filters: &FilterSet,
    ) -> Result<BoundQuery, QueryError> {
        self.validate(areas, years, filters)?;

        let filters = filters.normalized();
        let ctx = PredicateContext {
            areas,
            years,
            filters: &filters,
        };

        let mut binder = ParamBinder::new();
        let frags = build_predicates(&ctx, &mut binder);
        let sql = shapes::render(shape, &frags.join("\n  AND "));

        log::debug!(
            "Composed {shape} query over {} areas, {} years with {} params",
            areas.len(),
            years.len(),
            binder.len()
        );

        Ok(BoundQuery {
            shape,
            sql,
            params: binder.into_params(),
        })
    }
}

fn is_valid_lei(id: &str) -> bool {
    id.len() == LEI_LENGTH && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use lending_atlas_query_models::{ActionTaken, QueryParam};

    use super::*;

    fn areas(ids: &[&str]) -> BTreeSet<AreaId> {
        ids.iter().map(|id| AreaId::parse(id).unwrap()).collect()
    }

    #[test]
    fn rejects_too_many_areas_with_limit_and_count() {
        let composer = QueryComposer::new(ComposerLimits {
            max_areas: 2,
            max_years: 10,
        });
        let err = composer
            .compose(
                QueryShape::AreaTotals,
                &areas(&["01001", "01003", "01005"]),
                &[2022].into(),
                &FilterSet::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::Validation {
                message: "too many areas: limit is 2, received 3".to_string()
            }
        );
    }

    #[test]
    fn rejects_too_many_years() {
        let composer = QueryComposer::default();
        let years: BTreeSet<u16> = (2010..2021).collect();
        let err = composer
            .compose(
                QueryShape::TractActivity,
                &areas(&["06037"]),
                &years,
                &FilterSet::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("limit is 10, received 11"));
    }

    #[test]
    fn rejects_empty_sets_and_bad_years() {
        let composer = QueryComposer::default();
        let filters = FilterSet::default();
        assert!(
            composer
                .compose(QueryShape::AreaTotals, &BTreeSet::new(), &[2022].into(), &filters)
                .is_err()
        );
        assert!(
            composer
                .compose(QueryShape::AreaTotals, &areas(&["06037"]), &BTreeSet::new(), &filters)
                .is_err()
        );
        assert!(
            composer
                .compose(QueryShape::AreaTotals, &areas(&["06037"]), &[1999].into(), &filters)
                .is_err()
        );
    }

    #[test]
    fn rejects_malformed_lei() {
        let composer = QueryComposer::default();
        let filters = FilterSet {
            lender_ids: Some(["abc'; DROP TABLE x; --".to_string()].into()),
            ..FilterSet::default()
        };
        let err = composer
            .compose(QueryShape::LenderActivity, &areas(&["06037"]), &[2022].into(), &filters)
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation { .. }));
    }

    #[test]
    fn sql_contains_only_placeholders() {
        let composer = QueryComposer::default();
        let query = composer
            .compose(
                QueryShape::TractActivity,
                &areas(&["06037", "06059"]),
                &[2021, 2022].into(),
                &FilterSet {
                    actions_taken: Some([ActionTaken::Denied, ActionTaken::Originated].into()),
                    ..FilterSet::default()
                },
            )
            .unwrap();

        assert!(!query.sql.contains("06037"));
        assert!(!query.sql.contains("2021"));
        assert!(query.sql.contains("l.county_code IN ($1, $2)"));
        assert!(query.sql.contains("l.activity_year IN ($3, $4)"));
        assert!(query.sql.contains("l.action_taken IN ($6, $7)"));
        assert_eq!(query.params[5], QueryParam::Int(1));
        assert_eq!(query.params[6], QueryParam::Int(3));
        assert_eq!(query.shape, QueryShape::TractActivity);
    }

    #[test]
    fn composition_is_independent_of_input_order() {
        let composer = QueryComposer::default();
        let a = composer
            .compose(
                QueryShape::AreaTotals,
                &areas(&["06059", "06037"]),
                &[2022, 2021].into(),
                &FilterSet::default(),
            )
            .unwrap();
        let b = composer
            .compose(
                QueryShape::AreaTotals,
                &areas(&["06037", "06059"]),
                &[2021, 2022].into(),
                &FilterSet::default(),
            )
            .unwrap();
        assert_eq!(a, b);
    }
}
