//! `DuckDB`-backed county hierarchy.
//!
//! Reads and writes the `county_hierarchy` table created by
//! [`lending_atlas_database::schema::ensure_schema`]. Codes read back from
//! storage are re-parsed through [`AreaId::parse`] so a value stored
//! without its leading zero still comes back canonical.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckdb::Connection;
use lending_atlas_geography_models::{AreaId, CountyInfo};

use crate::{AreaHierarchy, GeoError};

/// A county row to upsert into `county_hierarchy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountyRecord {
    /// Canonical county code.
    pub area_id: AreaId,
    /// County name.
    pub name: String,
    /// State abbreviation.
    pub state_abbr: Option<String>,
}

/// A county's membership in a core-based statistical area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetroMembership {
    /// Canonical county code.
    pub area_id: AreaId,
    /// CBSA code.
    pub cbsa_code: String,
    /// CBSA title.
    pub cbsa_title: String,
}

/// [`AreaHierarchy`] over the `county_hierarchy` table.
#[derive(Clone)]
pub struct DuckDbHierarchy {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DuckDbHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbHierarchy").finish_non_exhaustive()
    }
}

impl DuckDbHierarchy {
    /// Wraps a connection whose schema is already in place.
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` on a blocking thread with the connection locked.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, GeoError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, GeoError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| GeoError::Hierarchy {
                message: format!("connection lock poisoned: {e}"),
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| GeoError::Hierarchy {
            message: format!("hierarchy task failed: {e}"),
        })?
    }

    /// Inserts or updates county names.
    ///
    /// Existing metro membership is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if a write fails.
    pub async fn upsert_counties(&self, records: Vec<CountyRecord>) -> Result<u64, GeoError> {
        self.with_conn(move |conn| upsert_counties(conn, &records))
            .await
    }

    /// Records metro membership for counties.
    ///
    /// Counties not yet in the table are inserted with their code as a
    /// placeholder name.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if a write fails.
    pub async fn upsert_metros(&self, memberships: Vec<MetroMembership>) -> Result<u64, GeoError> {
        self.with_conn(move |conn| upsert_metros(conn, &memberships))
            .await
    }
}

fn hierarchy_error(e: duckdb::Error) -> GeoError {
    GeoError::Hierarchy {
        message: e.to_string(),
    }
}

fn upsert_counties(conn: &Connection, records: &[CountyRecord]) -> Result<u64, GeoError> {
    let mut stmt = conn.prepare(
        "INSERT INTO county_hierarchy (county_geoid, county_name, state_fips, state_abbr)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (county_geoid) DO UPDATE SET
             county_name = EXCLUDED.county_name,
             state_abbr = COALESCE(EXCLUDED.state_abbr, county_hierarchy.state_abbr)",
    )?;

    let mut written = 0u64;
    for record in records {
        written += stmt.execute(duckdb::params![
            record.area_id.as_str(),
            record.name,
            record.area_id.state_fips(),
            record.state_abbr.as_deref(),
        ])? as u64;
    }

    Ok(written)
}

fn upsert_metros(conn: &Connection, memberships: &[MetroMembership]) -> Result<u64, GeoError> {
    let mut stmt = conn.prepare(
        "INSERT INTO county_hierarchy (county_geoid, county_name, state_fips, cbsa_code, cbsa_title)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (county_geoid) DO UPDATE SET
             cbsa_code = EXCLUDED.cbsa_code,
             cbsa_title = EXCLUDED.cbsa_title",
    )?;

    let mut written = 0u64;
    for m in memberships {
        written += stmt.execute(duckdb::params![
            m.area_id.as_str(),
            m.area_id.as_str(),
            m.area_id.state_fips(),
            m.cbsa_code,
            m.cbsa_title,
        ])? as u64;
    }

    Ok(written)
}

fn query_area_ids(conn: &Connection, sql: &str, param: &str) -> Result<BTreeSet<AreaId>, GeoError> {
    let mut stmt = conn.prepare(sql).map_err(hierarchy_error)?;
    stmt.raw_bind_parameter(1, param).map_err(hierarchy_error)?;
    stmt.raw_execute().map_err(hierarchy_error)?;

    let mut ids = BTreeSet::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(hierarchy_error)? {
        let raw: String = row.get(0).map_err(hierarchy_error)?;
        match AreaId::parse(&raw) {
            Ok(id) => {
                ids.insert(id);
            }
            Err(e) => log::warn!("Skipping malformed county code in hierarchy: {e}"),
        }
    }

    Ok(ids)
}

#[async_trait]
impl AreaHierarchy for DuckDbHierarchy {
    async fn counties_in_state(&self, state_fips: &str) -> Result<BTreeSet<AreaId>, GeoError> {
        let state_fips = state_fips.to_string();
        self.with_conn(move |conn| {
            query_area_ids(
                conn,
                "SELECT county_geoid FROM county_hierarchy WHERE state_fips = ?",
                &state_fips,
            )
        })
        .await
    }

    async fn counties_in_metro(&self, cbsa_code: &str) -> Result<BTreeSet<AreaId>, GeoError> {
        let cbsa_code = cbsa_code.to_string();
        self.with_conn(move |conn| {
            query_area_ids(
                conn,
                "SELECT county_geoid FROM county_hierarchy WHERE cbsa_code = ?",
                &cbsa_code,
            )
        })
        .await
    }

    async fn county_info(&self, area: &AreaId) -> Result<Option<CountyInfo>, GeoError> {
        let area = area.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT county_name, state_fips, state_abbr, cbsa_code, cbsa_title
                     FROM county_hierarchy WHERE county_geoid = ?",
                )
                .map_err(hierarchy_error)?;

            let result = stmt.query_row([area.as_str()], |row| {
                Ok(CountyInfo {
                    area_id: area.clone(),
                    name: row.get(0)?,
                    state_fips: row.get(1)?,
                    state_abbr: row.get(2)?,
                    cbsa_code: row.get(3)?,
                    cbsa_title: row.get(4)?,
                })
            });

            match result {
                Ok(info) => Ok(Some(info)),
                Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(hierarchy_error(e)),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> DuckDbHierarchy {
        DuckDbHierarchy::new(lending_atlas_database::schema::open_in_memory().unwrap())
    }

    fn id(raw: &str) -> AreaId {
        AreaId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn upserts_and_queries_membership() {
        let h = hierarchy();
        h.upsert_counties(vec![
            CountyRecord {
                area_id: id("06037"),
                name: "Los Angeles".to_string(),
                state_abbr: Some("CA".to_string()),
            },
            CountyRecord {
                area_id: id("06059"),
                name: "Orange".to_string(),
                state_abbr: Some("CA".to_string()),
            },
            CountyRecord {
                area_id: id("32003"),
                name: "Clark".to_string(),
                state_abbr: Some("NV".to_string()),
            },
        ])
        .await
        .unwrap();

        h.upsert_metros(vec![
            MetroMembership {
                area_id: id("06037"),
                cbsa_code: "31080".to_string(),
                cbsa_title: "Los Angeles-Long Beach-Anaheim, CA".to_string(),
            },
            MetroMembership {
                area_id: id("06059"),
                cbsa_code: "31080".to_string(),
                cbsa_title: "Los Angeles-Long Beach-Anaheim, CA".to_string(),
            },
        ])
        .await
        .unwrap();

        let ca = h.counties_in_state("06").await.unwrap();
        assert_eq!(ca, [id("06037"), id("06059")].into());

        let metro = h.counties_in_metro("31080").await.unwrap();
        assert_eq!(metro, [id("06037"), id("06059")].into());

        let info = h.county_info(&id("06059")).await.unwrap().unwrap();
        assert_eq!(info.name, "Orange");
        assert_eq!(info.state_abbr.as_deref(), Some("CA"));
        assert_eq!(info.cbsa_code.as_deref(), Some("31080"));

        assert!(h.county_info(&id("01001")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn county_upsert_keeps_metro_membership() {
        let h = hierarchy();
        h.upsert_metros(vec![MetroMembership {
            area_id: id("09001"),
            cbsa_code: "14860".to_string(),
            cbsa_title: "Bridgeport-Stamford-Danbury, CT".to_string(),
        }])
        .await
        .unwrap();
        h.upsert_counties(vec![CountyRecord {
            area_id: id("09001"),
            name: "Fairfield".to_string(),
            state_abbr: Some("CT".to_string()),
        }])
        .await
        .unwrap();

        let info = h.county_info(&id("09001")).await.unwrap().unwrap();
        assert_eq!(info.name, "Fairfield");
        assert_eq!(info.cbsa_code.as_deref(), Some("14860"));
    }

    #[tokio::test]
    async fn unpadded_codes_are_repadded_on_read() {
        let conn = lending_atlas_database::schema::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO county_hierarchy (county_geoid, county_name, state_fips)
             VALUES ('1001', 'Autauga', '01');",
        )
        .unwrap();
        let h = DuckDbHierarchy::new(conn);
        let ids = h.counties_in_state("01").await.unwrap();
        assert_eq!(ids, [id("01001")].into());
    }
}
