//! Expansion of geography selections into canonical county codes.

use std::collections::BTreeSet;
use std::sync::Arc;

use lending_atlas_geography_models::{
    AreaId, CountyInfo, GeographyKind, GeographySelection, states,
};

use crate::{AreaHierarchy, GeoError, planning_regions};

/// Expands [`GeographySelection`]s into sets of [`AreaId`]s.
///
/// Resolution holds no state between calls, so expanding the same
/// selection twice yields the same set.
#[derive(Clone)]
pub struct GeoidResolver {
    hierarchy: Arc<dyn AreaHierarchy>,
}

impl std::fmt::Debug for GeoidResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoidResolver").finish_non_exhaustive()
    }
}

fn invalid(selection: &GeographySelection, reason: impl Into<String>) -> GeoError {
    GeoError::Validation {
        selection: selection.to_string(),
        reason: reason.into(),
    }
}

impl GeoidResolver {
    /// Creates a resolver backed by `hierarchy`.
    #[must_use]
    pub fn new(hierarchy: Arc<dyn AreaHierarchy>) -> Self {
        Self { hierarchy }
    }

    /// Expands one selection.
    ///
    /// # Errors
    ///
    /// * [`GeoError::Validation`] if the identifier is malformed or the
    ///   selection resolves to no counties
    /// * any other [`GeoError`] if the hierarchy collaborator fails
    pub async fn expand(
        &self,
        selection: &GeographySelection,
    ) -> Result<BTreeSet<AreaId>, GeoError> {
        let raw = selection.raw_identifier.trim();

        let areas = match selection.kind {
            GeographyKind::County => {
                let id = AreaId::parse(raw).map_err(|e| invalid(selection, e.to_string()))?;
                if states::by_fips(id.state_fips()).is_none() {
                    return Err(invalid(
                        selection,
                        format!("unknown state code {}", id.state_fips()),
                    ));
                }
                BTreeSet::from([id])
            }
            GeographyKind::State => {
                let state = states::lookup(raw)
                    .ok_or_else(|| invalid(selection, "unknown state"))?;
                self.hierarchy
                    .counties_in_state(state.fips)
                    .await?
                    .into_iter()
                    .filter(|id| id.state_fips() == state.fips)
                    .collect()
            }
            GeographyKind::Metro => {
                if raw.is_empty() || raw.len() > 5 || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid(selection, "metro code must be 1-5 digits"));
                }
                let cbsa = format!("{raw:0>5}");
                self.hierarchy.counties_in_metro(&cbsa).await?
            }
            GeographyKind::PlanningRegion => {
                let region = planning_regions::lookup(raw)
                    .ok_or_else(|| invalid(selection, "unknown planning region"))?;
                region
                    .legacy_counties
                    .iter()
                    .copied()
                    .map(AreaId::parse)
                    .collect::<Result<BTreeSet<_>, _>>()?
            }
        };

        if areas.is_empty() {
            return Err(invalid(selection, "no counties found"));
        }

        log::debug!("Resolved {selection} to {} areas", areas.len());
        Ok(areas)
    }

    /// Expands several selections and returns the union.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Self::expand`].
    pub async fn expand_all(
        &self,
        selections: &[GeographySelection],
    ) -> Result<BTreeSet<AreaId>, GeoError> {
        let mut all = BTreeSet::new();
        for selection in selections {
            all.extend(self.expand(selection).await?);
        }
        Ok(all)
    }

    /// Display name and parent codes of a county.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the hierarchy collaborator fails.
    pub async fn describe(&self, area: &AreaId) -> Result<Option<CountyInfo>, GeoError> {
        self.hierarchy.county_info(area).await
    }
}
