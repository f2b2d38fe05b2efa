//! `DuckDB` cache store.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use duckdb::Connection;

use crate::{CacheEntry, CacheError, CacheKey, CacheStore, validate_namespace};

/// [`CacheStore`] backed by a `result_cache` table.
#[derive(Clone)]
pub struct DuckDbCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DuckDbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbCacheStore").finish_non_exhaustive()
    }
}

impl DuckDbCacheStore {
    /// Opens (or creates) a cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the directory, connection or schema
    /// creation fails.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Creates a store in an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if schema creation fails.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection, creating the table if missing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if schema creation fails.
    pub fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS result_cache (
                namespace TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                payload BLOB NOT NULL,
                created_at_ms BIGINT NOT NULL,
                ttl_secs BIGINT NOT NULL,
                PRIMARY KEY (namespace, cache_key)
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| CacheError::Backend {
                message: format!("connection lock poisoned: {e}"),
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| CacheError::Backend {
            message: format!("cache task failed: {e}"),
        })?
    }
}

#[async_trait]
impl CacheStore for DuckDbCacheStore {
    async fn get(
        &self,
        namespace: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        validate_namespace(namespace)?;
        let namespace = namespace.to_string();
        let key = key.clone();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload, created_at_ms, ttl_secs FROM result_cache
                 WHERE namespace = ? AND cache_key = ?",
            )?;
            let result = stmt.query_row([namespace.as_str(), key.as_str()], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            });

            let (payload, created_at_ms, ttl_secs) = match result {
                Ok(values) => values,
                Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            let created_at =
                DateTime::from_timestamp_millis(created_at_ms).ok_or_else(|| {
                    CacheError::Corrupt {
                        message: format!("timestamp {created_at_ms} out of range"),
                    }
                })?;

            Ok(Some(CacheEntry {
                key,
                namespace,
                payload,
                created_at,
                ttl: Duration::from_secs(u64::try_from(ttl_secs).unwrap_or_default()),
            }))
        })
        .await
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        validate_namespace(&entry.namespace)?;
        let entry = entry.clone();

        self.with_conn(move |conn| {
            let ttl_secs = i64::try_from(entry.ttl.as_secs()).unwrap_or(i64::MAX);
            conn.execute(
                "INSERT OR REPLACE INTO result_cache
                     (namespace, cache_key, payload, created_at_ms, ttl_secs)
                 VALUES (?, ?, ?, ?, ?)",
                duckdb::params![
                    entry.namespace,
                    entry.key.as_str(),
                    entry.payload,
                    entry.created_at.timestamp_millis(),
                    ttl_secs,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<u64, CacheError> {
        if let Some(ns) = namespace {
            validate_namespace(ns)?;
        }
        let namespace = namespace.map(str::to_string);

        self.with_conn(move |conn| {
            let removed = match &namespace {
                Some(ns) => conn.execute("DELETE FROM result_cache WHERE namespace = ?", [ns])?,
                None => conn.execute("DELETE FROM result_cache", [])?,
            };
            Ok(removed as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use lending_atlas_geography_models::AreaId;

    use super::*;

    fn entry(namespace: &str, year: u16) -> CacheEntry {
        let areas = [AreaId::parse("06037").unwrap()];
        CacheEntry {
            key: CacheKey::compute(&areas, [year], &()).unwrap(),
            namespace: namespace.to_string(),
            payload: format!("{{\"year\":{year}}}").into_bytes(),
            created_at: DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap(),
            ttl: Duration::from_secs(604_800),
        }
    }

    #[tokio::test]
    async fn round_trip_and_replace() {
        let store = DuckDbCacheStore::open_in_memory().unwrap();
        let e = entry("analysis", 2022);
        store.put(&e).await.unwrap();
        assert_eq!(store.get("analysis", &e.key).await.unwrap(), Some(e.clone()));

        let mut replaced = e.clone();
        replaced.payload = b"new".to_vec();
        store.put(&replaced).await.unwrap();
        assert_eq!(
            store.get("analysis", &e.key).await.unwrap().unwrap().payload,
            b"new"
        );

        assert!(store.get("demographics", &e.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_scopes() {
        let store = DuckDbCacheStore::open_in_memory().unwrap();
        store.put(&entry("analysis", 2021)).await.unwrap();
        store.put(&entry("analysis", 2022)).await.unwrap();
        store.put(&entry("demographics", 2022)).await.unwrap();

        assert_eq!(store.clear(Some("demographics")).await.unwrap(), 1);
        assert_eq!(store.clear(None).await.unwrap(), 2);
    }
}
