#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Content-addressed result cache.
//!
//! [`ResultCache`] wraps an expensive computation keyed by an area set, a
//! year set and a filter set. Keys are the SHA-256 of a canonical JSON
//! encoding of those inputs, so logically identical requests share an
//! entry regardless of how their collections were ordered.
//!
//! Entries live in a namespaced [`CacheStore`]:
//!
//! | Store | Layout |
//! |---|---|
//! | [`fs::FsCacheStore`] | `<dir>/<namespace>/<key>.entry` |
//! | [`duckdb_store::DuckDbCacheStore`] | `result_cache` table |
//! | [`memory::MemoryCacheStore`] | process memory |
//! | `r2::R2CacheStore` (feature `r2`) | `<prefix>/<namespace>/<key>` objects |
//!
//! The cache never fails a request: read errors are misses and write
//! errors are logged. Concurrent requests for the same missing key may
//! both compute and both write; the last write wins.

pub mod clock;
pub mod duckdb_store;
pub mod fs;
pub mod key;
pub mod memory;
#[cfg(feature = "r2")]
pub mod r2;
pub mod result_cache;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::CacheKey;
pub use result_cache::{CacheSettings, ResultCache};
pub use store::{CacheEntry, CacheStore};

/// Errors that can occur inside the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `DuckDB` operation failed.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Namespace contains characters other than `[A-Za-z0-9_-]`.
    #[error("Invalid cache namespace '{namespace}'")]
    InvalidNamespace {
        /// The rejected namespace.
        namespace: String,
    },

    /// A stored entry could not be decoded.
    #[error("Corrupt cache entry: {message}")]
    Corrupt {
        /// Description of what went wrong.
        message: String,
    },

    /// The storage backend failed.
    #[error("Cache backend error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },
}

/// Checks that `namespace` is a non-empty run of `[A-Za-z0-9_-]`.
///
/// # Errors
///
/// Returns [`CacheError::InvalidNamespace`] otherwise.
pub fn validate_namespace(namespace: &str) -> Result<(), CacheError> {
    if !namespace.is_empty()
        && namespace
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        Ok(())
    } else {
        Err(CacheError::InvalidNamespace {
            namespace: namespace.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_charset() {
        assert!(validate_namespace("analysis").is_ok());
        assert!(validate_namespace("acs-2022_v2").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("../etc").is_err());
        assert!(validate_namespace("a/b").is_err());
        assert!(validate_namespace("with space").is_err());
    }
}
