#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Filter and query types for the lending analytics pipeline.
//!
//! The code enums mirror the numeric codes used in the HMDA loan
//! application register. Every filter is set-valued so the order in which
//! a caller lists values can never change the composed query or its cache
//! key.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Purpose of the loan.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LoanPurpose {
    /// Home purchase.
    HomePurchase,
    /// Home improvement.
    HomeImprovement,
    /// Refinancing.
    Refinancing,
    /// Cash-out refinancing.
    CashOutRefinancing,
    /// Other purpose.
    Other,
    /// Not applicable.
    NotApplicable,
}

impl LoanPurpose {
    /// HMDA `loan_purpose` code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::HomePurchase => 1,
            Self::HomeImprovement => 2,
            Self::Refinancing => 31,
            Self::CashOutRefinancing => 32,
            Self::Other => 4,
            Self::NotApplicable => 5,
        }
    }
}

/// Action taken on the application.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ActionTaken {
    /// Loan originated.
    Originated = 1,
    /// Application approved but not accepted.
    ApprovedNotAccepted = 2,
    /// Application denied.
    Denied = 3,
    /// Application withdrawn by applicant.
    Withdrawn = 4,
    /// File closed for incompleteness.
    ClosedIncomplete = 5,
    /// Purchased loan.
    Purchased = 6,
    /// Preapproval request denied.
    PreapprovalDenied = 7,
    /// Preapproval request approved but not accepted.
    PreapprovalApprovedNotAccepted = 8,
}

impl ActionTaken {
    /// HMDA `action_taken` code.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// Occupancy type of the property.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Occupancy {
    /// Principal residence.
    PrincipalResidence = 1,
    /// Second residence.
    SecondResidence = 2,
    /// Investment property.
    Investment = 3,
}

impl Occupancy {
    /// HMDA `occupancy_type` code.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// Loan program type.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LoanType {
    /// Conventional (not insured or guaranteed).
    Conventional = 1,
    /// FHA insured.
    Fha = 2,
    /// VA guaranteed.
    Va = 3,
    /// USDA Rural Housing Service or Farm Service Agency.
    Usda = 4,
}

impl LoanType {
    /// HMDA `loan_type` code.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// A class of applications to leave out of the analysis.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Exclusion {
    /// Reverse mortgages.
    ReverseMortgage,
    /// Open-end lines of credit.
    OpenEndLineOfCredit,
    /// Loans made primarily for a business or commercial purpose.
    BusinessPurpose,
    /// Properties with more than four units.
    MultifamilyProperty,
}

impl Exclusion {
    /// Exclusions applied when the caller does not supply any.
    pub const DEFAULTS: [Self; 3] = [
        Self::ReverseMortgage,
        Self::OpenEndLineOfCredit,
        Self::BusinessPurpose,
    ];
}

/// Optional filters applied to an analytical query.
///
/// `None` means "use the documented default". For everything except
/// `exclusions`, an empty set is treated the same as `None`; an empty
/// `exclusions` set explicitly disables every exclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSet {
    /// Loan purposes to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_purposes: Option<BTreeSet<LoanPurpose>>,
    /// Actions taken to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_taken: Option<BTreeSet<ActionTaken>>,
    /// Occupancy types to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy_types: Option<BTreeSet<Occupancy>>,
    /// Loan types to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_types: Option<BTreeSet<LoanType>>,
    /// Legal entity identifiers of lenders to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lender_ids: Option<BTreeSet<String>>,
    /// Application classes to exclude.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusions: Option<BTreeSet<Exclusion>>,
}

impl FilterSet {
    /// Returns a copy with empty non-exclusion sets collapsed to `None` and
    /// lender identifiers trimmed and upper-cased.
    ///
    /// Two filter sets that compose the same query normalize to the same
    /// value, which keeps cache keys stable.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn non_empty<T: Ord + Clone>(set: Option<&BTreeSet<T>>) -> Option<BTreeSet<T>> {
            set.filter(|s| !s.is_empty()).cloned()
        }

        Self {
            loan_purposes: non_empty(self.loan_purposes.as_ref()),
            actions_taken: non_empty(self.actions_taken.as_ref()),
            occupancy_types: non_empty(self.occupancy_types.as_ref()),
            loan_types: non_empty(self.loan_types.as_ref()),
            lender_ids: self
                .lender_ids
                .as_ref()
                .map(|ids| {
                    ids.iter()
                        .map(|id| id.trim().to_ascii_uppercase())
                        .collect::<BTreeSet<_>>()
                })
                .filter(|ids| !ids.is_empty()),
            exclusions: self.exclusions.clone(),
        }
    }
}

/// The fixed analytical query shapes the composer can produce.
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum QueryShape {
    /// Activity per census tract and year, with tract demographics.
    TractActivity,
    /// Activity per county and year.
    AreaTotals,
    /// Activity per lender and year.
    LenderActivity,
    /// Activity per derived borrower race, ethnicity and year.
    BorrowerRace,
}

/// A value bound to a numbered query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// Integer parameter.
    Int(i64),
    /// Floating point parameter.
    Real(f64),
    /// Text parameter.
    Text(String),
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Query text with `$n` placeholders and the values bound to them.
///
/// `params[i]` is bound to placeholder `$(i + 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundQuery {
    /// Which fixed shape produced this query.
    pub shape: QueryShape,
    /// SQL text. Contains no caller-supplied values.
    pub sql: String,
    /// Positional parameter values.
    pub params: Vec<QueryParam>,
}
