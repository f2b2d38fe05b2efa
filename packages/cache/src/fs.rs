//! Filesystem cache store.
//!
//! Each entry is one file, `<dir>/<namespace>/<key>.entry`: a single JSON
//! header line followed by the raw payload bytes. Writes go to a temporary
//! file in the same directory and are renamed into place, so a reader
//! never sees a half-written entry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CacheEntry, CacheError, CacheKey, CacheStore, validate_namespace};

const ENTRY_EXTENSION: &str = "entry";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryHeader {
    key: String,
    namespace: String,
    created_at: DateTime<Utc>,
    ttl_secs: u64,
}

/// [`CacheStore`] backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    /// Creates a store rooted at `root`. The directory is created on the
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, namespace: &str, key: &CacheKey) -> PathBuf {
        self.root
            .join(namespace)
            .join(format!("{key}.{ENTRY_EXTENSION}"))
    }
}

fn encode(entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
    let header = EntryHeader {
        key: entry.key.to_string(),
        namespace: entry.namespace.clone(),
        created_at: entry.created_at,
        ttl_secs: entry.ttl.as_secs(),
    };
    let mut bytes = serde_json::to_vec(&header)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&entry.payload);
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<CacheEntry, CacheError> {
    let newline = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| CacheError::Corrupt {
            message: "missing header line".to_string(),
        })?;
    let header: EntryHeader = serde_json::from_slice(&bytes[..newline])?;

    Ok(CacheEntry {
        key: CacheKey::from_hex(&header.key)?,
        namespace: header.namespace,
        payload: bytes[newline + 1..].to_vec(),
        created_at: header.created_at,
        ttl: Duration::from_secs(header.ttl_secs),
    })
}

/// Removes every `.entry` file directly under `dir`.
async fn clear_dir(dir: &Path) -> Result<u64, CacheError> {
    let mut removed = 0u64;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn get(
        &self,
        namespace: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        validate_namespace(namespace)?;
        let path = self.entry_path(namespace, key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        decode(&bytes).map(Some)
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        validate_namespace(&entry.namespace)?;
        let path = self.entry_path(&entry.namespace, &entry.key);
        let dir = self.root.join(&entry.namespace);
        tokio::fs::create_dir_all(&dir).await?;

        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let tmp = dir.join(format!(
            ".{}.{}-{nanos}.tmp",
            entry.key,
            std::process::id()
        ));

        tokio::fs::write(&tmp, encode(entry)?).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        log::debug!("Cached {}/{} at {}", entry.namespace, entry.key, path.display());
        Ok(())
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<u64, CacheError> {
        if let Some(ns) = namespace {
            validate_namespace(ns)?;
            return clear_dir(&self.root.join(ns)).await;
        }

        let mut removed = 0u64;
        let mut dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(dir) = dirs.next_entry().await? {
            if dir.file_type().await?.is_dir() {
                removed += clear_dir(&dir.path()).await?;
            }
        }

        Ok(removed)
    }
}
