#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration for the lending atlas.
//!
//! Settings are read from a TOML file (every field optional) and then
//! overridden from the environment. Each component receives the settings
//! struct it needs from the accessors on [`AtlasConfig`].
//!
//! ```toml
//! [warehouse]
//! timeout_secs = 60
//!
//! [cache]
//! backend = "duckdb"
//!
//! [cache.namespace_ttl_secs]
//! demographics = 2592000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lending_atlas_analytics_models::GroupBy;
use lending_atlas_cache::CacheSettings;
use lending_atlas_census::AcsSettings;
use lending_atlas_database::paths;
use lending_atlas_database::schema::ConnectionSettings;
use lending_atlas_query::ComposerLimits;
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "LENDING_ATLAS_CONFIG";
/// Environment variable overriding the warehouse database path.
pub const WAREHOUSE_PATH_ENV: &str = "WAREHOUSE_PATH";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Could not read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`AtlasConfig`].
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent with another.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// `[data]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Root data directory; `data/` when unset.
    pub dir: Option<PathBuf>,
}

/// `[warehouse]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarehouseConfig {
    /// `DuckDB` file; `<data>/shared/warehouse.duckdb` when unset.
    pub path: Option<PathBuf>,
    /// Query timeout in seconds.
    pub timeout_secs: u64,
    /// `DuckDB` worker threads.
    pub threads: u32,
    /// `DuckDB` memory limit.
    pub memory_limit: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let connection = ConnectionSettings::default();
        Self {
            path: None,
            timeout_secs: 30,
            threads: connection.threads,
            memory_limit: connection.memory_limit,
        }
    }
}

/// `[census]`
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CensusConfig {
    /// Whether demographic composites can be requested.
    pub enabled: bool,
    /// API root.
    pub base_url: String,
    /// Survey vintage; the latest requested year when unset.
    pub vintage: Option<u16>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// API key read from `api_key_env`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for CensusConfig {
    fn default() -> Self {
        let acs = AcsSettings::default();
        Self {
            enabled: true,
            base_url: acs.base_url,
            vintage: None,
            api_key_env: "CENSUS_API_KEY".to_string(),
            timeout_secs: acs.timeout.as_secs(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for CensusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CensusConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("vintage", &self.vintage)
            .field("api_key_env", &self.api_key_env)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where cache entries are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// One file per entry under the cache directory.
    #[default]
    Filesystem,
    /// A `DuckDB` table in the shared data directory.
    Duckdb,
    /// Process memory; nothing survives a restart.
    Memory,
    /// Cloudflare R2 (requires the `r2` feature).
    R2,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Storage backend.
    pub backend: CacheBackend,
    /// Directory of the filesystem backend; `<data>/cache` when unset.
    pub dir: Option<PathBuf>,
    /// Entry lifetime for namespaces without an override.
    pub default_ttl_secs: u64,
    /// Per-namespace lifetimes.
    pub namespace_ttl_secs: BTreeMap<String, u64>,
    /// R2 bucket name.
    pub r2_bucket: Option<String>,
    /// Object key prefix inside the R2 bucket.
    pub r2_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            dir: None,
            default_ttl_secs: lending_atlas_cache::result_cache::DEFAULT_TTL.as_secs(),
            namespace_ttl_secs: BTreeMap::new(),
            r2_bucket: None,
            r2_prefix: "lending-atlas/cache".to_string(),
        }
    }
}

/// `[limits]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum counties per request.
    pub max_areas: usize,
    /// Maximum years per request.
    pub max_years: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = ComposerLimits::default();
        Self {
            max_areas: limits.max_areas,
            max_years: limits.max_years,
        }
    }
}

/// `[classification]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassificationConfig {
    /// How tracts are grouped before computing μ and σ.
    pub group_by: GroupBy,
}

/// The full configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AtlasConfig {
    /// `[data]`
    pub data: DataConfig,
    /// `[warehouse]`
    pub warehouse: WarehouseConfig,
    /// `[census]`
    pub census: CensusConfig,
    /// `[cache]`
    pub cache: CacheConfig,
    /// `[limits]`
    pub limits: LimitsConfig,
    /// `[classification]`
    pub classification: ClassificationConfig,
}

impl AtlasConfig {
    /// Loads configuration from `path`, or from `$LENDING_ATLAS_CONFIG`,
    /// or uses the defaults when neither is given; then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or a
    /// value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path, source })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration text without applying overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(text)?)
    }

    /// Applies environment overrides, reading variables through `env`.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = env(paths::DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            self.data.dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = env(WAREHOUSE_PATH_ENV).filter(|v| !v.is_empty()) {
            self.warehouse.path = Some(PathBuf::from(path));
        }
        self.census.api_key = env(&self.census.api_key_env).filter(|v| !v.is_empty());
    }

    /// Checks values that deserialize fine but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.limits.max_areas == 0 || self.limits.max_years == 0 {
            return invalid("limits must be greater than zero");
        }
        if self.warehouse.timeout_secs == 0 || self.census.timeout_secs == 0 {
            return invalid("timeouts must be greater than zero");
        }
        if self.cache.default_ttl_secs == 0 {
            return invalid("cache.default_ttl_secs must be greater than zero");
        }
        if self.cache.backend == CacheBackend::R2 && self.cache.r2_bucket.is_none() {
            return invalid("cache.r2_bucket is required for the r2 backend");
        }
        Ok(())
    }

    /// The data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data.dir.clone().unwrap_or_else(paths::data_dir)
    }

    /// The warehouse database file.
    #[must_use]
    pub fn warehouse_path(&self) -> PathBuf {
        self.warehouse
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("shared").join("warehouse.duckdb"))
    }

    /// The filesystem cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("cache"))
    }

    /// The `DuckDB` cache database file.
    #[must_use]
    pub fn cache_db_path(&self) -> PathBuf {
        self.data_dir().join("shared").join("result_cache.duckdb")
    }

    /// Warehouse query timeout.
    #[must_use]
    pub const fn warehouse_timeout(&self) -> Duration {
        Duration::from_secs(self.warehouse.timeout_secs)
    }

    /// `DuckDB` connection tuning.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            threads: self.warehouse.threads,
            memory_limit: self.warehouse.memory_limit.clone(),
        }
    }

    /// ACS client settings, including the API key if one was found.
    #[must_use]
    pub fn acs_settings(&self) -> AcsSettings {
        AcsSettings {
            base_url: self.census.base_url.clone(),
            api_key: self.census.api_key.clone(),
            timeout: Duration::from_secs(self.census.timeout_secs),
        }
    }

    /// Cache expiry settings.
    #[must_use]
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            default_ttl: Duration::from_secs(self.cache.default_ttl_secs),
            namespace_ttls: self
                .cache
                .namespace_ttl_secs
                .iter()
                .map(|(ns, secs)| (ns.clone(), Duration::from_secs(*secs)))
                .collect(),
        }
    }

    /// Query composer limits.
    #[must_use]
    pub const fn composer_limits(&self) -> ComposerLimits {
        ComposerLimits {
            max_areas: self.limits.max_areas,
            max_years: self.limits.max_years,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = AtlasConfig::from_toml("").unwrap();
        assert_eq!(config, AtlasConfig::default());
        assert_eq!(config.cache.default_ttl_secs, 604_800);
        assert_eq!(config.limits.max_areas, 500);
        assert_eq!(config.limits.max_years, 10);
        assert_eq!(config.classification.group_by, GroupBy::AreaSetYear);
        assert_eq!(config.cache.backend, CacheBackend::Filesystem);
    }

    #[test]
    fn parses_sections() {
        let config = AtlasConfig::from_toml(
            r#"
            [warehouse]
            path = "/srv/hmda.duckdb"
            timeout_secs = 90

            [cache]
            backend = "duckdb"
            default_ttl_secs = 3600

            [cache.namespace_ttl_secs]
            demographics = 2592000

            [limits]
            max_areas = 50

            [classification]
            group_by = "area_year"
            "#,
        )
        .unwrap();

        assert_eq!(config.warehouse_path(), PathBuf::from("/srv/hmda.duckdb"));
        assert_eq!(config.warehouse_timeout(), Duration::from_secs(90));
        assert_eq!(config.cache.backend, CacheBackend::Duckdb);
        assert_eq!(config.composer_limits().max_areas, 50);
        assert_eq!(config.composer_limits().max_years, 10);
        assert_eq!(config.classification.group_by, GroupBy::AreaYear);

        let settings = config.cache_settings();
        assert_eq!(settings.ttl_for("analysis"), Duration::from_secs(3600));
        assert_eq!(
            settings.ttl_for("demographics"),
            Duration::from_secs(2_592_000)
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            AtlasConfig::from_toml("[cache]\nbackend = \"redis\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            AtlasConfig::from_toml("[limits]\nmax_area = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn environment_overrides() {
        let mut config = AtlasConfig::from_toml(
            r#"
            [data]
            dir = "/var/lib/atlas"

            [census]
            api_key_env = "MY_CENSUS_KEY"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.warehouse_path(),
            PathBuf::from("/var/lib/atlas/shared/warehouse.duckdb")
        );

        config.apply_overrides(|name| match name {
            "WAREHOUSE_PATH" => Some("/tmp/w.duckdb".to_string()),
            "MY_CENSUS_KEY" => Some("abc123".to_string()),
            _ => None,
        });

        assert_eq!(config.warehouse_path(), PathBuf::from("/tmp/w.duckdb"));
        assert_eq!(config.cache_dir(), PathBuf::from("/var/lib/atlas/cache"));
        assert_eq!(config.acs_settings().api_key.as_deref(), Some("abc123"));
        assert!(!format!("{config:?}").contains("abc123"));
    }

    #[test]
    fn validation() {
        let mut config = AtlasConfig::default();
        assert!(config.validate().is_ok());

        config.cache.backend = CacheBackend::R2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));

        config.cache.r2_bucket = Some("atlas".to_string());
        assert!(config.validate().is_ok());

        config.limits.max_years = 0;
        assert!(config.validate().is_err());
    }
}
