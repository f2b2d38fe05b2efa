//! US state lookup by FIPS code, postal abbreviation, or name.
//!
//! Covers the 50 states, the District of Columbia and Puerto Rico, which
//! are the jurisdictions that report lending activity by census tract.

/// A state-equivalent jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    /// Two-digit FIPS code.
    pub fips: &'static str,
    /// Two-letter postal abbreviation.
    pub abbr: &'static str,
    /// Full name.
    pub name: &'static str,
}

const fn state(fips: &'static str, abbr: &'static str, name: &'static str) -> State {
    State { fips, abbr, name }
}

/// Every supported state-equivalent, ordered by FIPS code.
pub const STATES: &[State] = &[
    state("01", "AL", "Alabama"),
    state("02", "AK", "Alaska"),
    state("04", "AZ", "Arizona"),
    state("05", "AR", "Arkansas"),
    state("06", "CA", "California"),
    state("08", "CO", "Colorado"),
    state("09", "CT", "Connecticut"),
    state("10", "DE", "Delaware"),
    state("11", "DC", "District of Columbia"),
    state("12", "FL", "Florida"),
    state("13", "GA", "Georgia"),
    state("15", "HI", "Hawaii"),
    state("16", "ID", "Idaho"),
    state("17", "IL", "Illinois"),
    state("18", "IN", "Indiana"),
    state("19", "IA", "Iowa"),
    state("20", "KS", "Kansas"),
    state("21", "KY", "Kentucky"),
    state("22", "LA", "Louisiana"),
    state("23", "ME", "Maine"),
    state("24", "MD", "Maryland"),
    state("25", "MA", "Massachusetts"),
    state("26", "MI", "Michigan"),
    state("27", "MN", "Minnesota"),
    state("28", "MS", "Mississippi"),
    state("29", "MO", "Missouri"),
    state("30", "MT", "Montana"),
    state("31", "NE", "Nebraska"),
    state("32", "NV", "Nevada"),
    state("33", "NH", "New Hampshire"),
    state("34", "NJ", "New Jersey"),
    state("35", "NM", "New Mexico"),
    state("36", "NY", "New York"),
    state("37", "NC", "North Carolina"),
    state("38", "ND", "North Dakota"),
    state("39", "OH", "Ohio"),
    state("40", "OK", "Oklahoma"),
    state("41", "OR", "Oregon"),
    state("42", "PA", "Pennsylvania"),
    state("44", "RI", "Rhode Island"),
    state("45", "SC", "South Carolina"),
    state("46", "SD", "South Dakota"),
    state("47", "TN", "Tennessee"),
    state("48", "TX", "Texas"),
    state("49", "UT", "Utah"),
    state("50", "VT", "Vermont"),
    state("51", "VA", "Virginia"),
    state("53", "WA", "Washington"),
    state("54", "WV", "West Virginia"),
    state("55", "WI", "Wisconsin"),
    state("56", "WY", "Wyoming"),
    state("72", "PR", "Puerto Rico"),
];

/// Finds a state by its FIPS code, accepting unpadded input (`"6"`).
#[must_use]
pub fn by_fips(fips: &str) -> Option<&'static State> {
    let trimmed = fips.trim();
    if trimmed.is_empty() || trimmed.len() > 2 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{trimmed:0>2}");
    STATES.iter().find(|s| s.fips == padded)
}

/// Finds a state by postal abbreviation, case-insensitively.
#[must_use]
pub fn by_abbr(abbr: &str) -> Option<&'static State> {
    let trimmed = abbr.trim();
    STATES.iter().find(|s| s.abbr.eq_ignore_ascii_case(trimmed))
}

/// Finds a state by FIPS code, abbreviation, or full name.
#[must_use]
pub fn lookup(raw: &str) -> Option<&'static State> {
    let trimmed = raw.trim();
    by_fips(trimmed)
        .or_else(|| by_abbr(trimmed))
        .or_else(|| STATES.iter().find(|s| s.name.eq_ignore_ascii_case(trimmed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_and_unique() {
        for pair in STATES.windows(2) {
            assert!(pair[0].fips < pair[1].fips, "{} >= {}", pair[0].fips, pair[1].fips);
        }
        assert_eq!(STATES.len(), 52);
    }

    #[test]
    fn lookup_accepts_every_form() {
        for s in STATES {
            assert_eq!(lookup(s.fips), Some(s));
            assert_eq!(lookup(s.abbr), Some(s));
            assert_eq!(lookup(s.name), Some(s));
        }
    }

    #[test]
    fn unpadded_and_mixed_case() {
        assert_eq!(lookup("6").map(|s| s.abbr), Some("CA"));
        assert_eq!(lookup("ct").map(|s| s.fips), Some("09"));
        assert_eq!(lookup("new york").map(|s| s.fips), Some("36"));
    }

    #[test]
    fn unknown_codes() {
        assert!(lookup("03").is_none());
        assert!(lookup("XX").is_none());
        assert!(lookup("").is_none());
        assert!(by_fips("123").is_none());
    }
}
