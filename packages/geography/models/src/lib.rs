#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area and census tract identifier types.
//!
//! Every geography a user can pick (county, state, metro area, planning
//! region) is eventually expanded into a set of canonical five-digit county
//! codes ([`AreaId`]). Lending records are keyed below that by eleven-digit
//! census tract codes ([`TractId`]) whose first five digits name the owning
//! county.

pub mod states;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Errors produced when parsing a geographic identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The identifier was empty (or only whitespace).
    #[error("{kind} identifier is empty")]
    Empty {
        /// Identifier kind (e.g. "area", "tract").
        kind: &'static str,
    },

    /// The identifier contained a non-digit character.
    #[error("{kind} identifier '{value}' must contain only digits")]
    NonDigit {
        /// Identifier kind.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// The identifier had more digits than the canonical width.
    #[error("{kind} identifier '{value}' is longer than {width} digits")]
    TooLong {
        /// Identifier kind.
        kind: &'static str,
        /// The rejected input.
        value: String,
        /// Canonical width.
        width: usize,
    },
}

/// Left-pads a digit string to `width`, rejecting anything that is not a
/// non-empty run of at most `width` ASCII digits.
fn pad_digits(raw: &str, width: usize, kind: &'static str) -> Result<String, IdentifierError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(IdentifierError::Empty { kind });
    }

    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentifierError::NonDigit {
            kind,
            value: trimmed.to_string(),
        });
    }

    if trimmed.len() > width {
        return Err(IdentifierError::TooLong {
            kind,
            value: trimmed.to_string(),
            width,
        });
    }

    Ok(format!("{trimmed:0>width$}"))
}

/// Canonical five-digit county-equivalent code (state FIPS + county FIPS).
///
/// The only way to build one is [`AreaId::parse`], so an `AreaId` is always
/// exactly five zero-padded digits, including values read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AreaId(String);

impl AreaId {
    /// Canonical width of an area identifier.
    pub const WIDTH: usize = 5;

    /// Parses and zero-pads an area identifier (`"6037"` -> `"06037"`).
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] if the input is empty, contains
    /// non-digits, or is longer than five digits.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        pad_digits(raw, Self::WIDTH, "area").map(Self)
    }

    /// Builds an area identifier from separate state and county codes.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] if either part is not a valid code.
    pub fn from_parts(state_fips: &str, county_fips: &str) -> Result<Self, IdentifierError> {
        let state = pad_digits(state_fips, 2, "state")?;
        let county = pad_digits(county_fips, 3, "county")?;
        Ok(Self(format!("{state}{county}")))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit state FIPS prefix.
    #[must_use]
    pub fn state_fips(&self) -> &str {
        &self.0[..2]
    }

    /// Three-digit county FIPS suffix.
    #[must_use]
    pub fn county_fips(&self) -> &str {
        &self.0[2..]
    }
}

impl std::fmt::Display for AreaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AreaId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AreaId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AreaId> for String {
    fn from(value: AreaId) -> Self {
        value.0
    }
}

/// Canonical eleven-digit census tract code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TractId(String);

impl TractId {
    /// Canonical width of a tract identifier.
    pub const WIDTH: usize = 11;

    /// Parses and zero-pads a tract identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] if the input is empty, contains
    /// non-digits, or is longer than eleven digits.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        pad_digits(raw, Self::WIDTH, "tract").map(Self)
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The county that owns this tract (first five digits).
    #[must_use]
    pub fn area_id(&self) -> AreaId {
        AreaId(self.0[..AreaId::WIDTH].to_string())
    }

    /// Whether this tract lies inside `area`.
    #[must_use]
    pub fn belongs_to(&self, area: &AreaId) -> bool {
        self.0.starts_with(area.as_str())
    }
}

impl std::fmt::Display for TractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TractId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TractId> for String {
    fn from(value: TractId) -> Self {
        value.0
    }
}

/// The kind of geography a user selected.
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
pub enum GeographyKind {
    /// A single county or county-equivalent.
    County,
    /// Every county in a state.
    State,
    /// Every county in a core-based statistical area.
    Metro,
    /// A Connecticut planning region, mapped onto legacy county codes.
    PlanningRegion,
}

/// A geography picked by the user, before expansion to area identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeographySelection {
    /// What kind of geography `raw_identifier` names.
    pub kind: GeographyKind,
    /// The identifier exactly as the user supplied it.
    pub raw_identifier: String,
}

impl GeographySelection {
    /// Creates a selection of the given kind.
    #[must_use]
    pub fn new(kind: GeographyKind, raw_identifier: impl Into<String>) -> Self {
        Self {
            kind,
            raw_identifier: raw_identifier.into(),
        }
    }

    /// Selects a single county.
    #[must_use]
    pub fn county(raw_identifier: impl Into<String>) -> Self {
        Self::new(GeographyKind::County, raw_identifier)
    }

    /// Selects a whole state.
    #[must_use]
    pub fn state(raw_identifier: impl Into<String>) -> Self {
        Self::new(GeographyKind::State, raw_identifier)
    }

    /// Selects a metro area by CBSA code.
    #[must_use]
    pub fn metro(raw_identifier: impl Into<String>) -> Self {
        Self::new(GeographyKind::Metro, raw_identifier)
    }

    /// Selects a Connecticut planning region by code or name.
    #[must_use]
    pub fn planning_region(raw_identifier: impl Into<String>) -> Self {
        Self::new(GeographyKind::PlanningRegion, raw_identifier)
    }
}

impl std::fmt::Display for GeographySelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind, self.raw_identifier)
    }
}

/// Display name and parent codes of a county.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyInfo {
    /// Canonical county code.
    pub area_id: AreaId,
    /// County name (e.g. "Los Angeles County").
    pub name: String,
    /// Two-digit state FIPS code.
    pub state_fips: String,
    /// State abbreviation (e.g. "CA").
    pub state_abbr: Option<String>,
    /// Core-based statistical area code, if the county belongs to one.
    pub cbsa_code: Option<String>,
    /// Core-based statistical area title.
    pub cbsa_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_id_zero_pads() {
        assert_eq!(AreaId::parse("6037").unwrap().as_str(), "06037");
        assert_eq!(AreaId::parse(" 06037 ").unwrap().as_str(), "06037");
        assert_eq!(AreaId::parse("1").unwrap().as_str(), "00001");
    }

    #[test]
    fn area_id_rejects_bad_input() {
        assert!(matches!(
            AreaId::parse(""),
            Err(IdentifierError::Empty { .. })
        ));
        assert!(matches!(
            AreaId::parse("06-37"),
            Err(IdentifierError::NonDigit { .. })
        ));
        assert!(matches!(
            AreaId::parse("060370"),
            Err(IdentifierError::TooLong { width: 5, .. })
        ));
    }

    #[test]
    fn area_id_parts() {
        let id = AreaId::from_parts("6", "37").unwrap();
        assert_eq!(id.as_str(), "06037");
        assert_eq!(id.state_fips(), "06");
        assert_eq!(id.county_fips(), "037");
    }

    #[test]
    fn area_id_deserialization_repads() {
        let id: AreaId = serde_json::from_str("\"9001\"").unwrap();
        assert_eq!(id.as_str(), "09001");
        assert!(serde_json::from_str::<AreaId>("\"abc\"").is_err());
    }

    #[test]
    fn tract_owner() {
        let tract = TractId::parse("6037101110").unwrap();
        assert_eq!(tract.as_str(), "06037101110");
        assert_eq!(tract.area_id().as_str(), "06037");
        assert!(tract.belongs_to(&AreaId::parse("06037").unwrap()));
        assert!(!tract.belongs_to(&AreaId::parse("06059").unwrap()));
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!(
            "Planning_Region".parse::<GeographyKind>().unwrap(),
            GeographyKind::PlanningRegion
        );
        assert_eq!(GeographyKind::Metro.to_string(), "metro");
    }
}
