//! County hierarchy ingestion.
//!
//! County names come from the Census Bureau `TIGERweb` counties layer,
//! fetched per state. Metro membership comes from an OMB CBSA delineation
//! file exported as CSV. Both upsert into `county_hierarchy` through
//! [`DuckDbHierarchy`].

use std::path::Path;

use lending_atlas_geography_models::{AreaId, states};

use crate::GeoError;
use crate::hierarchy_db::{CountyRecord, DuckDbHierarchy, MetroMembership};

/// Counties layer of the `TIGERweb` ACS 2023 map service.
const TIGERWEB_COUNTIES_URL: &str =
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/tigerWMS_ACS2023/MapServer/82/query";

/// Page size for `TIGERweb` paginated requests.
const TIGERWEB_PAGE_SIZE: u32 = 100;

/// Maximum attempts per page request.
const TIGERWEB_MAX_RETRIES: u32 = 5;

/// User-Agent sent with `TIGERweb` requests.
const TIGERWEB_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; LendingAtlas/1.0; +https://github.com)";

/// Builds a `reqwest::Client` configured for `TIGERweb` requests.
///
/// # Errors
///
/// Returns [`GeoError`] if the client cannot be built.
pub fn build_tigerweb_client() -> Result<reqwest::Client, GeoError> {
    reqwest::Client::builder()
        .user_agent(TIGERWEB_USER_AGENT)
        .build()
        .map_err(Into::into)
}

/// Downloads every county feature of `state`, following `ArcGIS`
/// `exceededTransferLimit` paging.
async fn fetch_state_counties(
    client: &reqwest::Client,
    url: &str,
    state: &states::State,
) -> Result<Vec<serde_json::Value>, GeoError> {
    let mut features: Vec<serde_json::Value> = Vec::new();

    loop {
        let offset = u32::try_from(features.len()).unwrap_or(u32::MAX);
        let page_url =
            format!("{url}&resultRecordCount={TIGERWEB_PAGE_SIZE}&resultOffset={offset}");
        let page = fetch_county_page(client, &page_url, state, offset).await?;
        let (batch, more) = split_county_page(page, state, offset)?;

        let fetched = batch.len();
        features.extend(batch);

        if fetched == 0 || !more {
            return Ok(features);
        }

        log::debug!(
            "{}: {fetched} counties at offset {offset}, {} so far",
            state.abbr,
            features.len()
        );
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

/// Splits a county page into its features and whether more pages follow.
fn split_county_page(
    mut page: serde_json::Value,
    state: &states::State,
    offset: u32,
) -> Result<(Vec<serde_json::Value>, bool), GeoError> {
    let more = page
        .get("exceededTransferLimit")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    match page.get_mut("features").map(serde_json::Value::take) {
        Some(serde_json::Value::Array(features)) => Ok((features, more)),
        _ => Err(GeoError::Conversion {
            message: format!(
                "County page for {} at offset {offset} has no features",
                state.abbr
            ),
        }),
    }
}

/// Shortens a response body to at most `max_len` bytes for logging.
fn body_excerpt(body: &str, max_len: usize) -> String {
    if body.len() <= max_len {
        return body.to_string();
    }
    let mut end = max_len;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// One request for a county page. `Err` carries a short reason.
async fn request_county_page(
    client: &reqwest::Client,
    url: &str,
) -> Result<serde_json::Value, String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| format!("unreadable body: {e}"))?;

    if !status.is_success() {
        return Err(format!("status {status}, body {}", body_excerpt(&body, 500)));
    }

    let json: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| format!("invalid JSON ({e}), body {}", body_excerpt(&body, 500)))?;

    // ArcGIS reports query failures as 200 with {"error": {...}}.
    if let Some(error) = json.get("error") {
        return Err(format!(
            "service error {}: {}",
            error.get("code").and_then(serde_json::Value::as_i64).unwrap_or(0),
            error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
        ));
    }

    Ok(json)
}

/// Requests a county page up to [`TIGERWEB_MAX_RETRIES`] times, doubling
/// the wait between attempts (2s, 4s, 8s, ...).
async fn fetch_county_page(
    client: &reqwest::Client,
    url: &str,
    state: &states::State,
    offset: u32,
) -> Result<serde_json::Value, GeoError> {
    let mut reason = String::new();

    for attempt in 1..=TIGERWEB_MAX_RETRIES {
        match request_county_page(client, url).await {
            Ok(json) => return Ok(json),
            Err(e) => reason = e,
        }

        if attempt < TIGERWEB_MAX_RETRIES {
            let wait = std::time::Duration::from_secs(1 << attempt);
            log::warn!(
                "County page for {} at offset {offset}: {reason}; attempt {attempt} of {TIGERWEB_MAX_RETRIES}, waiting {}s",
                state.abbr,
                wait.as_secs()
            );
            tokio::time::sleep(wait).await;
        }
    }

    Err(GeoError::Conversion {
        message: format!(
            "Gave up on county page for {} at offset {offset} after {TIGERWEB_MAX_RETRIES} attempts: {reason}",
            state.abbr
        ),
    })
}

/// Extracts county records from `TIGERweb` county features.
///
/// Accepts both `f=json` (`attributes`) and `f=geojson` (`properties`)
/// features. Features without a usable `STATE`/`COUNTY` pair are skipped.
#[must_use]
pub fn parse_county_features(
    features: &[serde_json::Value],
    state_abbr: Option<&str>,
) -> Vec<CountyRecord> {
    let mut records = Vec::with_capacity(features.len());

    for feature in features {
        let attrs = feature
            .get("attributes")
            .or_else(|| feature.get("properties"))
            .unwrap_or(&serde_json::Value::Null);

        let state = attrs["STATE"].as_str().unwrap_or_default();
        let county = attrs["COUNTY"].as_str().unwrap_or_default();

        let area_id = match AreaId::from_parts(state, county) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Skipping TIGERweb county feature: {e}");
                continue;
            }
        };

        let name = attrs["BASENAME"]
            .as_str()
            .or_else(|| attrs["NAME"].as_str())
            .unwrap_or(area_id.as_str())
            .to_string();

        records.push(CountyRecord {
            area_id,
            name,
            state_abbr: state_abbr.map(str::to_string),
        });
    }

    records
}

/// Loads county names for one state from `TIGERweb`.
///
/// Accepts any form [`states::lookup`] understands.
///
/// # Errors
///
/// Returns [`GeoError::Validation`] for an unknown state, or another
/// [`GeoError`] if the download or database write fails.
pub async fn ingest_state_counties(
    hierarchy: &DuckDbHierarchy,
    client: &reqwest::Client,
    state: &str,
) -> Result<u64, GeoError> {
    let state = states::lookup(state).ok_or_else(|| GeoError::Validation {
        selection: format!("state '{state}'"),
        reason: "unknown state".to_string(),
    })?;

    let url = format!(
        "{TIGERWEB_COUNTIES_URL}\
         ?where=STATE%3D%27{}%27\
         &outFields=STATE,COUNTY,BASENAME,NAME\
         &returnGeometry=false\
         &f=json",
        state.fips
    );

    log::info!("Downloading {} ({}) counties from TIGERweb", state.abbr, state.fips);

    let features = fetch_state_counties(client, &url, state).await?;
    let records = parse_county_features(&features, Some(state.abbr));
    let written = hierarchy.upsert_counties(records).await?;

    log::info!(
        "State {} ({}): upserted {written} counties from {} features",
        state.fips,
        state.abbr,
        features.len()
    );

    Ok(written)
}

/// Lower-cases a header and drops everything but letters and digits, so
/// `"FIPS State Code"` and `fipsstatecode` compare equal.
fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parses CBSA delineation rows from CSV.
///
/// Requires `cbsacode`, `cbsatitle`, `fipsstatecode` and `fipscountycode`
/// columns (header matching ignores case, spaces and punctuation). Rows
/// with a malformed county code are skipped with a warning.
///
/// # Errors
///
/// Returns [`GeoError`] if the CSV cannot be read or a required column is
/// missing.
pub fn parse_delineation<R: std::io::Read>(reader: R) -> Result<Vec<MetroMembership>, GeoError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(normalize_header).collect();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| GeoError::Conversion {
                message: format!("delineation file has no '{name}' column"),
            })
    };
    let cbsa_idx = column("cbsacode")?;
    let title_idx = column("cbsatitle")?;
    let state_idx = column("fipsstatecode")?;
    let county_idx = column("fipscountycode")?;

    let mut memberships = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or_default().trim();

        let cbsa_code = field(cbsa_idx);
        if cbsa_code.is_empty() {
            continue;
        }

        match AreaId::from_parts(field(state_idx), field(county_idx)) {
            Ok(area_id) => memberships.push(MetroMembership {
                area_id,
                cbsa_code: format!("{cbsa_code:0>5}"),
                cbsa_title: field(title_idx).to_string(),
            }),
            Err(e) => log::warn!("Skipping delineation row for CBSA {cbsa_code}: {e}"),
        }
    }

    Ok(memberships)
}

/// Loads CBSA membership from a delineation CSV file.
///
/// # Errors
///
/// Returns [`GeoError`] if the file cannot be read or parsed, or the
/// database write fails.
pub async fn load_delineation_csv(
    hierarchy: &DuckDbHierarchy,
    path: &Path,
) -> Result<u64, GeoError> {
    let file = std::fs::File::open(path)?;
    let memberships = parse_delineation(file)?;
    let count = memberships.len();
    let written = hierarchy.upsert_metros(memberships).await?;

    log::info!(
        "Loaded {count} metro memberships from {} ({written} rows written)",
        path.display()
    );

    Ok(written)
}
