//! ACS 5-year API client.

use std::time::Duration;

use async_trait::async_trait;
use lending_atlas_geography_models::AreaId;

use crate::{AreaDemographics, DemographicError, DemographicSource, IncomeBracketCount};

/// Total population (Hispanic or Latino origin by race universe).
pub const TOTAL_POPULATION: &str = "B03002_001E";
/// Not Hispanic or Latino, white alone.
pub const WHITE_NON_HISPANIC: &str = "B03002_003E";
/// Total households.
pub const HOUSEHOLDS: &str = "B11001_001E";
/// Median household income in the past 12 months.
pub const MEDIAN_HOUSEHOLD_INCOME: &str = "B19013_001E";

/// Household income brackets (`B19001_002E` through `B19001_017E`).
pub const INCOME_BRACKETS: [(&str, &str); 16] = [
    ("B19001_002E", "Less than $10,000"),
    ("B19001_003E", "$10,000 to $14,999"),
    ("B19001_004E", "$15,000 to $19,999"),
    ("B19001_005E", "$20,000 to $24,999"),
    ("B19001_006E", "$25,000 to $29,999"),
    ("B19001_007E", "$30,000 to $34,999"),
    ("B19001_008E", "$35,000 to $39,999"),
    ("B19001_009E", "$40,000 to $44,999"),
    ("B19001_010E", "$45,000 to $49,999"),
    ("B19001_011E", "$50,000 to $59,999"),
    ("B19001_012E", "$60,000 to $74,999"),
    ("B19001_013E", "$75,000 to $99,999"),
    ("B19001_014E", "$100,000 to $124,999"),
    ("B19001_015E", "$125,000 to $149,999"),
    ("B19001_016E", "$150,000 to $199,999"),
    ("B19001_017E", "$200,000 or more"),
];

/// Connection settings for [`AcsClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcsSettings {
    /// API root, e.g. `https://api.census.gov/data`.
    pub base_url: String,
    /// Optional API key appended as `&key=`.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for AcsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.census.gov/data".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`DemographicSource`] backed by the ACS 5-year API.
///
/// Requests are not retried; a failed call is reported to the caller.
#[derive(Debug, Clone)]
pub struct AcsClient {
    client: reqwest::Client,
    settings: AcsSettings,
}

impl AcsClient {
    /// Builds a client with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DemographicError`] if the HTTP client cannot be built.
    pub fn new(settings: AcsSettings) -> Result<Self, DemographicError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    /// Endpoint of the ACS 5-year table for `vintage`.
    #[must_use]
    pub fn endpoint(&self, vintage: u16) -> String {
        format!(
            "{}/{vintage}/acs/acs5",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    /// Builds the request for one county. Query pairs, the API key
    /// included, are URL-encoded by reqwest.
    ///
    /// # Errors
    ///
    /// Returns [`DemographicError`] if the request cannot be built.
    pub fn county_request(
        &self,
        area: &AreaId,
        vintage: u16,
    ) -> Result<reqwest::Request, DemographicError> {
        let fields: Vec<&str> = [
            TOTAL_POPULATION,
            WHITE_NON_HISPANIC,
            HOUSEHOLDS,
            MEDIAN_HOUSEHOLD_INCOME,
        ]
        .into_iter()
        .chain(INCOME_BRACKETS.iter().map(|(code, _)| *code))
        .collect();

        let mut params = vec![
            ("get", fields.join(",")),
            ("for", format!("county:{}", area.county_fips())),
            ("in", format!("state:{}", area.state_fips())),
        ];
        if let Some(key) = &self.settings.api_key {
            params.push(("key", key.clone()));
        }

        Ok(self
            .client
            .get(self.endpoint(vintage))
            .query(&params)
            .build()?)
    }
}

#[async_trait]
impl DemographicSource for AcsClient {
    async fn area_demographics(
        &self,
        area: &AreaId,
        vintage: u16,
    ) -> Result<AreaDemographics, DemographicError> {
        let request = self.county_request(area, vintage)?;
        log::debug!("Fetching ACS {vintage} demographics for {area}");

        let resp = self.client.execute(request).await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(DemographicError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        parse_county_response(&body, area, vintage)
    }
}

/// Parses an ACS value cell. Census reports suppressed or unavailable
/// estimates as negative sentinels (e.g. `-666666666`), which become
/// `None`.
fn parse_count(cell: &serde_json::Value) -> Option<u64> {
    let value = match cell {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };

    if !value.is_finite() || value < 0.0 {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(value.round() as u64)
}

/// Parses an ACS response body for one county.
///
/// The body is a JSON array of arrays whose first row holds the column
/// names. Columns are located by name, so the field order of the request
/// does not matter.
///
/// # Errors
///
/// Returns [`DemographicError`] if the body is not an array of arrays, a
/// required column is missing, or no row matches the county.
pub fn parse_county_response(
    body: &str,
    area: &AreaId,
    vintage: u16,
) -> Result<AreaDemographics, DemographicError> {
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(body)?;
    let Some((header, data)) = rows.split_first() else {
        return Err(DemographicError::NotFound {
            area: area.clone(),
            vintage,
        });
    };

    let header: Vec<&str> = header.iter().map(|h| h.as_str().unwrap_or("")).collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| DemographicError::Conversion {
                message: format!("ACS response has no '{name}' column"),
            })
    };

    let state_idx = column("state")?;
    let county_idx = column("county")?;

    let row = data
        .iter()
        .find(|row| {
            row.get(state_idx).and_then(serde_json::Value::as_str) == Some(area.state_fips())
                && row.get(county_idx).and_then(serde_json::Value::as_str)
                    == Some(area.county_fips())
        })
        .ok_or_else(|| DemographicError::NotFound {
            area: area.clone(),
            vintage,
        })?;

    let value = |name: &str| -> Result<Option<u64>, DemographicError> {
        let idx = column(name)?;
        Ok(row.get(idx).and_then(parse_count))
    };

    let total_population = value(TOTAL_POPULATION)?;
    let white_non_hispanic = value(WHITE_NON_HISPANIC)?;
    let minority_population = match (total_population, white_non_hispanic) {
        (Some(total), Some(white)) => Some(total.saturating_sub(white)),
        _ => None,
    };

    let income_brackets = INCOME_BRACKETS
        .iter()
        .map(|(code, label)| {
            Ok(IncomeBracketCount {
                label: (*label).to_string(),
                households: value(*code)?,
            })
        })
        .collect::<Result<Vec<_>, DemographicError>>()?;

    Ok(AreaDemographics {
        area_id: area.clone(),
        vintage,
        total_population,
        minority_population,
        households: value(HOUSEHOLDS)?,
        median_household_income: value(MEDIAN_HOUSEHOLD_INCOME)?,
        income_brackets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body(median: &str) -> String {
        let mut header = vec![
            TOTAL_POPULATION.to_string(),
            WHITE_NON_HISPANIC.to_string(),
            HOUSEHOLDS.to_string(),
            MEDIAN_HOUSEHOLD_INCOME.to_string(),
        ];
        let mut row = vec![
            "957419".to_string(),
            "552064".to_string(),
            "356911".to_string(),
            median.to_string(),
        ];
        for (i, (code, _)) in INCOME_BRACKETS.iter().enumerate() {
            header.push((*code).to_string());
            row.push((1000 + i).to_string());
        }
        header.push("state".to_string());
        header.push("county".to_string());
        row.push("09".to_string());
        row.push("001".to_string());

        serde_json::to_string(&vec![header, row]).unwrap()
    }

    fn fairfield() -> AreaId {
        AreaId::parse("09001").unwrap()
    }

    #[test]
    fn parses_county_row_by_header() {
        let demo = parse_county_response(&sample_body("116638"), &fairfield(), 2022).unwrap();
        assert_eq!(demo.total_population, Some(957_419));
        assert_eq!(demo.minority_population, Some(957_419 - 552_064));
        assert_eq!(demo.households, Some(356_911));
        assert_eq!(demo.median_household_income, Some(116_638));
        assert_eq!(demo.income_brackets.len(), 16);
        assert_eq!(demo.income_brackets[0].label, "Less than $10,000");
        assert_eq!(demo.income_brackets[15].households, Some(1015));
        let pct = demo.minority_pct().unwrap();
        assert!((pct - 42.338).abs() < 0.01, "{pct}");
    }

    #[test]
    fn negative_sentinels_become_none() {
        let demo =
            parse_county_response(&sample_body("-666666666"), &fairfield(), 2022).unwrap();
        assert_eq!(demo.median_household_income, None);
    }

    #[test]
    fn missing_county_is_not_found() {
        let other = AreaId::parse("09003").unwrap();
        assert!(matches!(
            parse_county_response(&sample_body("1"), &other, 2022),
            Err(DemographicError::NotFound { .. })
        ));
        assert!(matches!(
            parse_county_response("[]", &other, 2022),
            Err(DemographicError::NotFound { .. })
        ));
    }

    #[test]
    fn request_encodes_every_field_and_optional_key() {
        let client = AcsClient::new(AcsSettings {
            api_key: Some("a&b=c d".to_string()),
            ..AcsSettings::default()
        })
        .unwrap();
        let request = client.county_request(&fairfield(), 2022).unwrap();
        let url = request.url();
        assert_eq!(
            url.as_str().split('?').next(),
            Some("https://api.census.gov/data/2022/acs/acs5")
        );

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let value = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert!(value("get").unwrap().starts_with("B03002_001E,"));
        assert!(value("get").unwrap().ends_with("B19001_017E"));
        assert_eq!(value("for"), Some("county:001"));
        assert_eq!(value("in"), Some("state:09"));
        assert_eq!(value("key"), Some("a&b=c d"));
        assert_eq!(pairs.len(), 4);

        let anonymous = AcsClient::new(AcsSettings::default()).unwrap();
        let request = anonymous.county_request(&fairfield(), 2022).unwrap();
        assert!(request.url().query_pairs().all(|(k, _)| k != "key"));
    }
}
