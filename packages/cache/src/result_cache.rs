//! The result cache wrapped around the analysis pipeline.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lending_atlas_geography_models::AreaId;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CacheEntry, CacheError, CacheKey, CacheStore, Clock, SystemClock, validate_namespace};

/// Default entry lifetime: seven days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Expiry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// TTL for namespaces without an override.
    pub default_ttl: Duration,
    /// Per-namespace TTL overrides.
    pub namespace_ttls: BTreeMap<String, Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            namespace_ttls: BTreeMap::new(),
        }
    }
}

impl CacheSettings {
    /// The TTL applied to new entries in `namespace`.
    #[must_use]
    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.namespace_ttls
            .get(namespace)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// Content-addressed cache in front of an expensive computation.
///
/// Storage failures never surface to callers: a failed read is a miss and
/// a failed write is logged.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("clock", &self.clock)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    /// Creates a cache over `store` using the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), settings)
    }

    /// Creates a cache with an explicit clock.
    #[must_use]
    pub fn with_clock(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// The expiry configuration.
    #[must_use]
    pub const fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Computes the key for a request.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Json`] if `filters` cannot be serialized.
    pub fn key<'a, A, Y, F>(areas: A, years: Y, filters: &F) -> Result<CacheKey, CacheError>
    where
        A: IntoIterator<Item = &'a AreaId>,
        Y: IntoIterator<Item = u16>,
        F: Serialize + ?Sized,
    {
        CacheKey::compute(areas, years, filters)
    }

    /// Returns the payload stored under `key` if it has not expired.
    ///
    /// Storage errors are logged and reported as a miss.
    pub async fn get(&self, namespace: &str, key: &CacheKey) -> Option<Vec<u8>> {
        match self.store.get(namespace, key).await {
            Ok(Some(entry)) if entry.is_expired(self.clock.now()) => {
                log::debug!("Cache expired: {namespace}/{key}");
                None
            }
            Ok(Some(entry)) => {
                log::debug!("Cache hit: {namespace}/{key}");
                Some(entry.payload)
            }
            Ok(None) => {
                log::debug!("Cache miss: {namespace}/{key}");
                None
            }
            Err(e) => {
                log::warn!("Cache read failed for {namespace}/{key}, treating as miss: {e}");
                None
            }
        }
    }

    /// Stores `payload` under `key`, replacing any previous entry.
    ///
    /// Storage errors are logged and discarded.
    pub async fn set(&self, namespace: &str, key: &CacheKey, payload: Vec<u8>) {
        let entry = CacheEntry {
            key: key.clone(),
            namespace: namespace.to_string(),
            payload,
            created_at: self.clock.now(),
            ttl: self.settings.ttl_for(namespace),
        };

        if let Err(e) = self.store.put(&entry).await {
            log::warn!("Cache write failed for {namespace}/{key}: {e}");
        }
    }

    /// Removes entries in `namespace`, or all entries when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the namespace is invalid or the store
    /// cannot be cleared. Unlike reads and writes, an explicit clear
    /// reports its failure.
    pub async fn clear(&self, namespace: Option<&str>) -> Result<u64, CacheError> {
        if let Some(ns) = namespace {
            validate_namespace(ns)?;
        }
        let removed = self.store.clear(namespace).await?;
        log::info!(
            "Cleared {removed} cache entries from {}",
            namespace.unwrap_or("all namespaces")
        );
        Ok(removed)
    }

    /// Reads and decodes a fresh entry. Undecodable payloads are misses.
    pub async fn lookup<T: DeserializeOwned>(&self, namespace: &str, key: &CacheKey) -> Option<T> {
        let payload = self.get(namespace, key).await?;
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Discarding undecodable cache entry {namespace}/{key}: {e}");
                None
            }
        }
    }

    /// Encodes and stores a value. Encoding errors are logged.
    pub async fn store<T: Serialize + Sync>(&self, namespace: &str, key: &CacheKey, value: &T) {
        match serde_json::to_vec(value) {
            Ok(payload) => self.set(namespace, key, payload).await,
            Err(e) => log::warn!("Could not encode cache entry {namespace}/{key}: {e}"),
        }
    }

    /// Returns the cached result for the request, or runs `compute` and
    /// caches every `Ok` result.
    ///
    /// # Errors
    ///
    /// Returns whatever `compute` returns; the cache itself never fails
    /// the call.
    pub async fn get_or_compute<'a, T, E, A, Y, F, C, Fut>(
        &self,
        namespace: &str,
        areas: A,
        years: Y,
        filters: &F,
        compute: C,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Sync,
        A: IntoIterator<Item = &'a AreaId>,
        Y: IntoIterator<Item = u16>,
        F: Serialize + ?Sized,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_compute_if(namespace, areas, years, filters, |_| true, compute)
            .await
    }

    /// Like [`Self::get_or_compute`], but only stores results for which
    /// `should_store` returns `true`.
    ///
    /// # Errors
    ///
    /// Returns whatever `compute` returns.
    pub async fn get_or_compute_if<'a, T, E, A, Y, F, S, C, Fut>(
        &self,
        namespace: &str,
        areas: A,
        years: Y,
        filters: &F,
        should_store: S,
        compute: C,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Sync,
        A: IntoIterator<Item = &'a AreaId>,
        Y: IntoIterator<Item = u16>,
        F: Serialize + ?Sized,
        S: FnOnce(&T) -> bool,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(e) = validate_namespace(namespace) {
            log::warn!("Bypassing cache: {e}");
            return compute().await;
        }

        let key = match CacheKey::compute(areas, years, filters) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Bypassing cache, could not build key: {e}");
                return compute().await;
            }
        };

        if let Some(value) = self.lookup(namespace, &key).await {
            return Ok(value);
        }

        let value = compute().await?;

        if should_store(&value) {
            self.store(namespace, &key, &value).await;
        } else {
            log::debug!("Not caching {namespace}/{key}: result rejected for storage");
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::ManualClock;
    use crate::memory::MemoryCacheStore;

    fn ids(values: &[&str]) -> Vec<AreaId> {
        values.iter().map(|v| AreaId::parse(v).unwrap()).collect()
    }

    fn cache_with_clock() -> (ResultCache, Arc<ManualClock>, Arc<MemoryCacheStore>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ResultCache::with_clock(
            store.clone(),
            clock.clone(),
            CacheSettings {
                default_ttl: Duration::from_secs(3600),
                namespace_ttls: [("demographics".to_string(), Duration::from_secs(86_400))]
                    .into(),
            },
        );
        (cache, clock, store)
    }

    #[tokio::test]
    async fn set_then_get_round_trips_until_ttl() {
        let (cache, clock, _) = cache_with_clock();
        let key = ResultCache::key(&ids(&["06037"]), [2022], &()).unwrap();

        cache.set("analysis", &key, b"payload".to_vec()).await;
        assert_eq!(cache.get("analysis", &key).await, Some(b"payload".to_vec()));

        clock.advance(chrono::Duration::seconds(3600));
        assert!(cache.get("analysis", &key).await.is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get("analysis", &key).await, None);
    }

    #[tokio::test]
    async fn namespace_ttl_overrides_default() {
        let (cache, clock, _) = cache_with_clock();
        let key = ResultCache::key(&ids(&["06037"]), [2022], &()).unwrap();
        cache.set("demographics", &key, b"d".to_vec()).await;

        clock.advance(chrono::Duration::hours(12));
        assert!(cache.get("demographics", &key).await.is_some());
    }

    #[tokio::test]
    async fn get_or_compute_short_circuits_on_hit() {
        let (cache, _, _) = cache_with_clock();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let filters = serde_json::json!({"loanTypes": ["fha"]});

        for order in [["06037", "06059"], ["06059", "06037"]] {
            let areas = ids(&order);
            let value: Result<u32, std::convert::Infallible> = cache
                .get_or_compute("analysis", &areas, [2022, 2021], &filters, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await;
            assert_eq!(value.unwrap(), 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let (cache, clock, _) = cache_with_clock();
        let areas = ids(&["06037"]);
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let run = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>(calls.load(Ordering::SeqCst))
        };

        assert_eq!(
            cache.get_or_compute("analysis", &areas, [2022], &(), run).await.unwrap(),
            1
        );
        clock.advance(chrono::Duration::seconds(7200));
        assert_eq!(
            cache.get_or_compute("analysis", &areas, [2022], &(), run).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn errors_and_rejected_results_are_not_stored() {
        let (cache, _, store) = cache_with_clock();
        let areas = ids(&["06037"]);

        let failed: Result<u32, &str> = cache
            .get_or_compute("analysis", &areas, [2022], &(), || async { Err("boom") })
            .await;
        assert_eq!(failed, Err("boom"));

        let partial: Result<u32, &str> = cache
            .get_or_compute_if("analysis", &areas, [2022], &(), |v| *v > 100, || async { Ok(7) })
            .await;
        assert_eq!(partial, Ok(7));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_miss() {
        let (cache, _, _) = cache_with_clock();
        let areas = ids(&["06037"]);
        let key = ResultCache::key(&areas, [2022], &()).unwrap();
        cache.set("analysis", &key, b"not json".to_vec()).await;

        let value: Result<u32, std::convert::Infallible> = cache
            .get_or_compute("analysis", &areas, [2022], &(), || async { Ok(5) })
            .await;
        assert_eq!(value.unwrap(), 5);
        assert_eq!(cache.lookup::<u32>("analysis", &key).await, Some(5));
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _: &str, _: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }

        async fn put(&self, _: &CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }

        async fn clear(&self, _: Option<&str>) -> Result<u64, CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }
    }

    #[tokio::test]
    async fn storage_failures_never_fail_the_request() {
        let cache = ResultCache::new(Arc::new(BrokenStore), CacheSettings::default());
        let areas = ids(&["06037"]);

        let value: Result<String, std::convert::Infallible> = cache
            .get_or_compute("analysis", &areas, [2022], &(), || async {
                Ok("fresh".to_string())
            })
            .await;
        assert_eq!(value.unwrap(), "fresh");

        assert!(cache.clear(None).await.is_err());
    }

    #[tokio::test]
    async fn invalid_namespace_bypasses_cache() {
        let (cache, _, store) = cache_with_clock();
        let areas = ids(&["06037"]);
        let value: Result<u8, std::convert::Infallible> = cache
            .get_or_compute("bad/ns", &areas, [2022], &(), || async { Ok(1) })
            .await;
        assert_eq!(value.unwrap(), 1);
        assert!(store.is_empty().await);
        assert!(cache.clear(Some("bad/ns")).await.is_err());
    }
}
