//! In-process cache store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{CacheEntry, CacheError, CacheKey, CacheStore};

/// [`CacheStore`] held in memory. Entries are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<(String, CacheKey), CacheEntry>>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(
        &self,
        namespace: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(namespace.to_string(), key.clone()))
            .cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert((entry.namespace.clone(), entry.key.clone()), entry.clone());
        Ok(())
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        match namespace {
            Some(ns) => entries.retain(|(entry_ns, _), _| entry_ns != ns),
            None => entries.clear(),
        }
        Ok((before - entries.len()) as u64)
    }
}
