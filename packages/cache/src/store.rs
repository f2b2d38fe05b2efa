//! The cache storage interface.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{CacheError, CacheKey};

/// One stored result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Content hash of the request.
    pub key: CacheKey,
    /// Namespace the entry lives in.
    pub namespace: String,
    /// Encoded result.
    pub payload: Vec<u8>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// Maximum age at which the entry is still valid.
    pub ttl: Duration,
}

impl CacheEntry {
    /// Whether the entry is past its TTL at `now`.
    ///
    /// An entry is still valid when its age equals its TTL exactly. An
    /// entry stamped in the future (clock skew) counts as fresh.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at)
            .to_std()
            .is_ok_and(|age| age > self.ttl)
    }
}

/// A namespaced key to entry store.
///
/// Each entry carries its own creation time and TTL; stores do not expire
/// anything themselves.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads the entry for `key` in `namespace`, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be read.
    async fn get(&self, namespace: &str, key: &CacheKey)
    -> Result<Option<CacheEntry>, CacheError>;

    /// Writes `entry`, replacing any previous entry with the same
    /// namespace and key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be written.
    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Removes every entry in `namespace`, or every entry in the store when
    /// `namespace` is `None`. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be modified.
    async fn clear(&self, namespace: Option<&str>) -> Result<u64, CacheError>;
}
