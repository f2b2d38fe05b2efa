//! Content-addressed cache keys.

use lending_atlas_geography_models::AreaId;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::CacheError;

/// Hex-encoded SHA-256 of a request's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key for an area set, a year set and a filter value.
    ///
    /// Areas and years are sorted and deduplicated; object keys inside
    /// `filters` are sorted recursively. The canonical form is
    /// `{"areas":[..],"filters":..,"years":[..]}` serialized without
    /// whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Json`] if `filters` cannot be serialized.
    pub fn compute<'a, A, Y, F>(areas: A, years: Y, filters: &F) -> Result<Self, CacheError>
    where
        A: IntoIterator<Item = &'a AreaId>,
        Y: IntoIterator<Item = u16>,
        F: Serialize + ?Sized,
    {
        let canonical = canonical_request(areas, years, filters)?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(Self(hex::encode(digest)))
    }

    /// Wraps a previously computed key (e.g. one read back from storage).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Corrupt`] unless `raw` is 64 lowercase hex
    /// characters.
    pub fn from_hex(raw: &str) -> Result<Self, CacheError> {
        if raw.len() == 64 && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(Self(raw.to_string()))
        } else {
            Err(CacheError::Corrupt {
                message: format!("'{raw}' is not a cache key"),
            })
        }
    }

    /// The key as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical_request<'a, A, Y, F>(areas: A, years: Y, filters: &F) -> Result<String, CacheError>
where
    A: IntoIterator<Item = &'a AreaId>,
    Y: IntoIterator<Item = u16>,
    F: Serialize + ?Sized,
{
    let mut areas: Vec<&str> = areas.into_iter().map(AreaId::as_str).collect();
    areas.sort_unstable();
    areas.dedup();

    let mut years: Vec<u16> = years.into_iter().collect();
    years.sort_unstable();
    years.dedup();

    let filters = sort_keys(serde_json::to_value(filters)?);

    let mut out = String::from("{\"areas\":");
    out.push_str(&serde_json::to_string(&areas)?);
    out.push_str(",\"filters\":");
    out.push_str(&serde_json::to_string(&filters)?);
    out.push_str(",\"years\":");
    out.push_str(&serde_json::to_string(&years)?);
    out.push('}');
    Ok(out)
}

/// Rebuilds every object with its keys in sorted order.
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn ids(values: &[&str]) -> Vec<AreaId> {
        values.iter().map(|v| AreaId::parse(v).unwrap()).collect()
    }

    #[test]
    fn key_is_invariant_under_permutation() {
        let filters = serde_json::json!({"loanTypes": ["fha"], "actionsTaken": ["originated"]});
        let a = CacheKey::compute(&ids(&["06037", "06059"]), [2021, 2022], &filters).unwrap();
        let b = CacheKey::compute(&ids(&["06059", "06037"]), [2022, 2021], &filters).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn filter_key_order_does_not_matter() {
        let mut x = BTreeMap::new();
        x.insert("b", 1);
        x.insert("a", 2);
        let y = serde_json::json!({"a": 2, "b": 1});
        let areas = ids(&["06037"]);
        assert_eq!(
            CacheKey::compute(&areas, [2022], &x).unwrap(),
            CacheKey::compute(&areas, [2022], &y).unwrap()
        );
    }

    #[test]
    fn duplicates_collapse() {
        let filters = serde_json::json!({});
        let a = CacheKey::compute(&ids(&["06037", "06037"]), [2022, 2022], &filters).unwrap();
        let b = CacheKey::compute(&ids(&["06037"]), [2022], &filters).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let filters = serde_json::json!({});
        let areas = ids(&["06037"]);
        let a = CacheKey::compute(&areas, [2021], &filters).unwrap();
        let b = CacheKey::compute(&areas, [2022], &filters).unwrap();
        let c = CacheKey::compute(&areas, [2021], &serde_json::json!({"x": 1})).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn canonical_form() {
        let areas = ids(&["6059", "06037"]);
        let canonical =
            canonical_request(&areas, [2022, 2021], &serde_json::json!({"z": {"b": 1, "a": 2}}))
                .unwrap();
        assert_eq!(
            canonical,
            r#"{"areas":["06037","06059"],"filters":{"z":{"a":2,"b":1}},"years":[2021,2022]}"#
        );
    }

    #[test]
    fn from_hex_validates() {
        let key = CacheKey::compute(&ids(&["06037"]), [2022], &()).unwrap();
        assert_eq!(CacheKey::from_hex(key.as_str()).unwrap(), key);
        assert!(CacheKey::from_hex("../../etc/passwd").is_err());
    }
}
