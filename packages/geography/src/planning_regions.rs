//! Connecticut planning regions.
//!
//! In 2022 Connecticut replaced its eight counties with nine planning
//! regions as county-equivalents, but lending and demographic data are
//! still keyed by the legacy county codes. Each region maps to the legacy
//! counties that contain its member towns.

/// A planning region and the legacy counties it overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanningRegion {
    /// Five-digit county-equivalent code of the region.
    pub code: &'static str,
    /// Region name without the "Planning Region" suffix.
    pub name: &'static str,
    /// Legacy county codes containing the region's towns.
    pub legacy_counties: &'static [&'static str],
}

const SUFFIX: &str = "planning region";

/// Every Connecticut planning region, ordered by code.
pub const PLANNING_REGIONS: &[PlanningRegion] = &[
    PlanningRegion {
        code: "09110",
        name: "Capitol",
        legacy_counties: &["09003", "09013"],
    },
    PlanningRegion {
        code: "09120",
        name: "Greater Bridgeport",
        legacy_counties: &["09001"],
    },
    PlanningRegion {
        code: "09130",
        name: "Lower Connecticut River Valley",
        legacy_counties: &["09007", "09011"],
    },
    PlanningRegion {
        code: "09140",
        name: "Naugatuck Valley",
        legacy_counties: &["09001", "09005", "09009"],
    },
    PlanningRegion {
        code: "09150",
        name: "Northeastern Connecticut",
        legacy_counties: &["09011", "09013", "09015"],
    },
    PlanningRegion {
        code: "09160",
        name: "Northwest Hills",
        legacy_counties: &["09003", "09005"],
    },
    PlanningRegion {
        code: "09170",
        name: "South Central Connecticut",
        legacy_counties: &["09009"],
    },
    PlanningRegion {
        code: "09180",
        name: "Southeastern Connecticut",
        legacy_counties: &["09011"],
    },
    PlanningRegion {
        code: "09190",
        name: "Western Connecticut",
        legacy_counties: &["09001", "09005"],
    },
];

/// Finds a planning region by code or name.
///
/// Names match case-insensitively, with or without a trailing "Planning
/// Region". Codes may omit the leading zero (`"9120"`).
#[must_use]
pub fn lookup(raw: &str) -> Option<&'static PlanningRegion> {
    let trimmed = raw.trim();

    if !trimmed.is_empty() && trimmed.len() <= 5 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let padded = format!("{trimmed:0>5}");
        return PLANNING_REGIONS.iter().find(|r| r.code == padded);
    }

    let lowered = trimmed.to_ascii_lowercase();
    let name = lowered
        .strip_suffix(SUFFIX)
        .map_or(lowered.as_str(), str::trim_end);

    PLANNING_REGIONS
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
}
