//! In-memory [`AreaHierarchy`] built from a list of counties.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use lending_atlas_geography_models::{AreaId, CountyInfo};

use crate::{AreaHierarchy, GeoError};

/// A fixed county hierarchy held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHierarchy {
    counties: BTreeMap<AreaId, CountyInfo>,
}

impl MemoryHierarchy {
    /// Builds a hierarchy from county records. Later duplicates win.
    #[must_use]
    pub fn new(counties: impl IntoIterator<Item = CountyInfo>) -> Self {
        Self {
            counties: counties
                .into_iter()
                .map(|c| (c.area_id.clone(), c))
                .collect(),
        }
    }
}

#[async_trait]
impl AreaHierarchy for MemoryHierarchy {
    async fn counties_in_state(&self, state_fips: &str) -> Result<BTreeSet<AreaId>, GeoError> {
        Ok(self
            .counties
            .keys()
            .filter(|id| id.state_fips() == state_fips)
            .cloned()
            .collect())
    }

    async fn counties_in_metro(&self, cbsa_code: &str) -> Result<BTreeSet<AreaId>, GeoError> {
        Ok(self
            .counties
            .values()
            .filter(|c| c.cbsa_code.as_deref() == Some(cbsa_code))
            .map(|c| c.area_id.clone())
            .collect())
    }

    async fn county_info(&self, area: &AreaId) -> Result<Option<CountyInfo>, GeoError> {
        Ok(self.counties.get(area).cloned())
    }
}
