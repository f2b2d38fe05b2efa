//! Cloudflare R2 cache store.
//!
//! Entries are S3 objects at `<prefix>/<namespace>/<key>` with the payload
//! as the body and the creation time and TTL in object metadata.
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |---|---|
//! | `CLOUDFLARE_ACCOUNT_ID` | Cloudflare account ID (builds the R2 endpoint) |
//! | `R2_ACCESS_KEY_ID` | S3-compatible access key for R2 |
//! | `R2_SECRET_ACCESS_KEY` | S3-compatible secret key for R2 |

use std::time::Duration;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use chrono::DateTime;

use crate::{CacheEntry, CacheError, CacheKey, CacheStore, validate_namespace};

const CREATED_AT_META: &str = "created-at-ms";
const TTL_META: &str = "ttl-secs";

/// Credentials and location of the cache bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct R2Settings {
    /// Cloudflare account ID.
    pub account_id: String,
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Bucket holding the cache.
    pub bucket: String,
    /// Key prefix under which namespaces live.
    pub prefix: String,
}

impl std::fmt::Debug for R2Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Settings")
            .field("account_id", &self.account_id)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

fn require_env(name: &str) -> Result<String, CacheError> {
    std::env::var(name).map_err(|_| CacheError::Backend {
        message: format!("Missing environment variable: {name}"),
    })
}

impl R2Settings {
    /// Reads credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if a variable is unset.
    pub fn from_env(bucket: impl Into<String>, prefix: impl Into<String>) -> Result<Self, CacheError> {
        Ok(Self {
            account_id: require_env("CLOUDFLARE_ACCOUNT_ID")?,
            access_key_id: require_env("R2_ACCESS_KEY_ID")?,
            secret_access_key: require_env("R2_SECRET_ACCESS_KEY")?,
            bucket: bucket.into(),
            prefix: prefix.into(),
        })
    }
}

/// [`CacheStore`] backed by an R2 bucket.
#[derive(Debug, Clone)]
pub struct R2CacheStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

fn backend<E: std::fmt::Display>(action: &str, key: &str, e: E) -> CacheError {
    CacheError::Backend {
        message: format!("{action} {key} failed: {e}"),
    }
}

impl R2CacheStore {
    /// Builds a client for the configured account.
    #[must_use]
    pub fn new(settings: R2Settings) -> Self {
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", settings.account_id);
        let creds = Credentials::new(
            &settings.access_key_id,
            &settings.secret_access_key,
            None,
            None,
            "r2-cache",
        );

        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(&endpoint)
            .region(Region::new("auto"))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket: settings.bucket,
            prefix: settings.prefix.trim_end_matches('/').to_string(),
        }
    }

    fn namespace_prefix(&self, namespace: &str) -> String {
        if self.prefix.is_empty() {
            format!("{namespace}/")
        } else {
            format!("{}/{namespace}/", self.prefix)
        }
    }

    fn object_key(&self, namespace: &str, key: &CacheKey) -> String {
        format!("{}{key}", self.namespace_prefix(namespace))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| backend("list", prefix, e))?;

            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for R2CacheStore {
    async fn get(
        &self,
        namespace: &str,
        key: &CacheKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        validate_namespace(namespace)?;
        let object_key = self.object_key(namespace, key);

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key)
                {
                    return Ok(None);
                }
                return Err(backend("get", &object_key, err));
            }
        };

        let meta = |name: &str| -> Result<i64, CacheError> {
            output
                .metadata()
                .and_then(|m| m.get(name))
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| CacheError::Corrupt {
                    message: format!("{object_key} has no {name} metadata"),
                })
        };
        let created_at_ms = meta(CREATED_AT_META)?;
        let ttl_secs = meta(TTL_META)?;

        let created_at =
            DateTime::from_timestamp_millis(created_at_ms).ok_or_else(|| CacheError::Corrupt {
                message: format!("timestamp {created_at_ms} out of range"),
            })?;

        let payload = output
            .body
            .collect()
            .await
            .map_err(|e| backend("read", &object_key, e))?
            .into_bytes()
            .to_vec();

        Ok(Some(CacheEntry {
            key: key.clone(),
            namespace: namespace.to_string(),
            payload,
            created_at,
            ttl: Duration::from_secs(u64::try_from(ttl_secs).unwrap_or_default()),
        }))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        validate_namespace(&entry.namespace)?;
        let object_key = self.object_key(&entry.namespace, &entry.key);
        let body = aws_sdk_s3::primitives::ByteStream::from(entry.payload.clone());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(body)
            .content_type("application/octet-stream")
            .metadata(CREATED_AT_META, entry.created_at.timestamp_millis().to_string())
            .metadata(TTL_META, entry.ttl.as_secs().to_string())
            .send()
            .await
            .map_err(|e| backend("put", &object_key, e))?;

        Ok(())
    }

    async fn clear(&self, namespace: Option<&str>) -> Result<u64, CacheError> {
        let prefix = match namespace {
            Some(ns) => {
                validate_namespace(ns)?;
                self.namespace_prefix(ns)
            }
            None if self.prefix.is_empty() => String::new(),
            None => format!("{}/", self.prefix),
        };

        let keys = self.list_keys(&prefix).await?;
        for key in &keys {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| backend("delete", key, e))?;
        }

        log::info!("Removed {} cache objects under s3://{}/{prefix}", keys.len(), self.bucket);
        Ok(keys.len() as u64)
    }
}
