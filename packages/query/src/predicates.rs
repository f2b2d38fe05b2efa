//! Ordered predicate builders for the `WHERE` clause.
//!
//! Each builder inspects one filter field. When the field is present it
//! emits a predicate for the supplied values; when it is absent it emits
//! the documented default (or nothing, for filters without one). Builders
//! run in the order of [`PREDICATES`] so the placeholder numbering of a
//! given request is deterministic.

use std::collections::BTreeSet;

use lending_atlas_geography_models::AreaId;
use lending_atlas_query_models::{
    ActionTaken, Exclusion, FilterSet, LoanPurpose, Occupancy, QueryParam,
};

/// Hands out `$n` placeholders and records the values bound to them.
#[derive(Debug, Default)]
pub struct ParamBinder {
    params: Vec<QueryParam>,
}

impl ParamBinder {
    /// Creates an empty binder; the first placeholder is `$1`.
    #[must_use]
    pub const fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Binds one value and returns its placeholder.
    pub fn bind(&mut self, value: impl Into<QueryParam>) -> String {
        self.params.push(value.into());
        format!("${}", self.params.len())
    }

    /// Binds every value and returns a parenthesized placeholder list,
    /// e.g. `($3, $4, $5)`.
    pub fn bind_list<I, V>(&mut self, values: I) -> String
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        let placeholders: Vec<String> = values.into_iter().map(|v| self.bind(v)).collect();
        format!("({})", placeholders.join(", "))
    }

    /// Number of values bound so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether nothing has been bound yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Consumes the binder, returning the positional parameters.
    #[must_use]
    pub fn into_params(self) -> Vec<QueryParam> {
        self.params
    }
}

/// Inputs visible to every predicate builder.
#[derive(Debug, Clone, Copy)]
pub struct PredicateContext<'a> {
    /// Canonical county codes to include.
    pub areas: &'a BTreeSet<AreaId>,
    /// Activity years to include.
    pub years: &'a BTreeSet<u16>,
    /// Normalized filters.
    pub filters: &'a FilterSet,
}

/// Appends zero or one predicate for a single filter concern.
pub type PredicateBuilder = fn(&PredicateContext<'_>, &mut ParamBinder) -> Option<String>;

/// The predicate builders, in the order they are applied.
pub const PREDICATES: &[(&str, PredicateBuilder)] = &[
    ("area", area_predicate),
    ("year", year_predicate),
    ("loan_purpose", loan_purpose_predicate),
    ("action_taken", action_taken_predicate),
    ("occupancy", occupancy_predicate),
    ("loan_type", loan_type_predicate),
    ("lender", lender_predicate),
    ("exclusions", exclusion_predicate),
];

/// Runs every builder and returns the resulting predicate fragments.
#[must_use]
pub fn build_predicates(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Vec<String> {
    let mut frags = Vec::new();

    for (name, builder) in PREDICATES {
        if let Some(frag) = builder(ctx, binder) {
            log::trace!("predicate {name}: {frag}");
            frags.push(frag);
        }
    }

    frags
}

fn area_predicate(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Option<String> {
    let list = binder.bind_list(ctx.areas.iter().map(AreaId::as_str));
    Some(format!("l.county_code IN {list}"))
}

fn year_predicate(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Option<String> {
    let list = binder.bind_list(ctx.years.iter().map(|y| i64::from(*y)));
    Some(format!("l.activity_year IN {list}"))
}

fn loan_purpose_predicate(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Option<String> {
    let codes: Vec<i64> = ctx.filters.loan_purposes.as_ref().map_or_else(
        || vec![LoanPurpose::HomePurchase.code()],
        |set| set.iter().map(|p| p.code()).collect(),
    );
    Some(format!("l.loan_purpose IN {}", binder.bind_list(codes)))
}

fn action_taken_predicate(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Option<String> {
    let codes: Vec<i64> = ctx.filters.actions_taken.as_ref().map_or_else(
        || vec![ActionTaken::Originated.code()],
        |set| set.iter().map(|a| a.code()).collect(),
    );
    Some(format!("l.action_taken IN {}", binder.bind_list(codes)))
}

fn occupancy_predicate(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Option<String> {
    let codes: Vec<i64> = ctx.filters.occupancy_types.as_ref().map_or_else(
        || vec![Occupancy::PrincipalResidence.code()],
        |set| set.iter().map(|o| o.code()).collect(),
    );
    Some(format!("l.occupancy_type IN {}", binder.bind_list(codes)))
}

fn loan_type_predicate(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Option<String> {
    let types = ctx.filters.loan_types.as_ref()?;
    let list = binder.bind_list(types.iter().map(|t| t.code()));
    Some(format!("l.loan_type IN {list}"))
}

fn lender_predicate(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Option<String> {
    let ids = ctx.filters.lender_ids.as_ref()?;
    let list = binder.bind_list(ids.iter().map(String::as_str));
    Some(format!("l.lei IN {list}"))
}

fn exclusion_predicate(ctx: &PredicateContext<'_>, binder: &mut ParamBinder) -> Option<String> {
    let exclusions: BTreeSet<Exclusion> = ctx
        .filters
        .exclusions
        .clone()
        .unwrap_or_else(|| Exclusion::DEFAULTS.into_iter().collect());

    if exclusions.is_empty() {
        return None;
    }

    let frags: Vec<String> = exclusions
        .iter()
        .map(|exclusion| match exclusion {
            // HMDA flags use 1 = yes, 2 = no; missing flags are kept.
            Exclusion::ReverseMortgage => {
                format!("COALESCE(l.reverse_mortgage, 0) <> {}", binder.bind(1_i64))
            }
            Exclusion::OpenEndLineOfCredit => format!(
                "COALESCE(l.open_end_line_of_credit, 0) <> {}",
                binder.bind(1_i64)
            ),
            Exclusion::BusinessPurpose => format!(
                "COALESCE(l.business_or_commercial_purpose, 0) <> {}",
                binder.bind(1_i64)
            ),
            Exclusion::MultifamilyProperty => {
                format!("COALESCE(l.total_units, 1) <= {}", binder.bind(4_i64))
            }
        })
        .collect();

    Some(frags.join(" AND "))
}
