//! Builds the pipeline components from configuration.

use std::sync::Arc;

use duckdb::Connection;
use lending_atlas_analytics::AnalysisPipeline;
use lending_atlas_cache::duckdb_store::DuckDbCacheStore;
use lending_atlas_cache::fs::FsCacheStore;
use lending_atlas_cache::memory::MemoryCacheStore;
use lending_atlas_cache::{CacheError, CacheStore, ResultCache};
use lending_atlas_census::{AcsClient, DemographicError};
use lending_atlas_config::{AtlasConfig, CacheBackend, ConfigError};
use lending_atlas_database::DbError;
use lending_atlas_database::schema;
use lending_atlas_database::warehouse::DuckDbWarehouse;
use lending_atlas_geography::hierarchy_db::DuckDbHierarchy;
use lending_atlas_geography::{GeoError, GeoidResolver};
use lending_atlas_query::QueryComposer;

/// Errors surfaced by the command-line front end.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The warehouse could not be opened.
    #[error(transparent)]
    Database(#[from] DbError),

    /// The cache backend could not be built or cleared.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Geography resolution or ingestion failed.
    #[error(transparent)]
    Geography(#[from] GeoError),

    /// The analysis request was rejected.
    #[error(transparent)]
    Analytics(#[from] lending_atlas_analytics::AnalyticsError),

    /// The demographic client could not be built.
    #[error(transparent)]
    Demographics(#[from] DemographicError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration asks for something this build cannot do.
    #[error("{message}")]
    Unsupported {
        /// Description of the problem.
        message: String,
    },
}

/// Opens the warehouse `DuckDB` file named by the configuration.
///
/// # Errors
///
/// Returns [`CliError::Database`] if the file cannot be opened.
pub fn open_warehouse(config: &AtlasConfig) -> Result<Connection, CliError> {
    let path = config.warehouse_path();
    log::debug!("Opening warehouse {}", path.display());
    Ok(schema::open(&path, &config.connection_settings())?)
}

/// A resolver over the warehouse's `county_hierarchy` table.
///
/// # Errors
///
/// Returns [`CliError::Database`] if the connection cannot be cloned.
pub fn hierarchy(conn: &Connection) -> Result<DuckDbHierarchy, CliError> {
    Ok(DuckDbHierarchy::new(conn.try_clone().map_err(DbError::from)?))
}

/// Builds the cache store selected in `[cache]`.
///
/// # Errors
///
/// Returns [`CliError`] if the store cannot be opened, or the `r2`
/// backend is selected in a build without the `r2` feature.
pub async fn cache_store(config: &AtlasConfig) -> Result<Arc<dyn CacheStore>, CliError> {
    let store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Filesystem => Arc::new(FsCacheStore::new(config.cache_dir())),
        CacheBackend::Duckdb => Arc::new(DuckDbCacheStore::open(&config.cache_db_path())?),
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
        CacheBackend::R2 => r2_store(config).await?,
    };
    Ok(store)
}

#[cfg(feature = "r2")]
#[allow(clippy::unused_async)]
async fn r2_store(config: &AtlasConfig) -> Result<Arc<dyn CacheStore>, CliError> {
    use lending_atlas_cache::r2::{R2CacheStore, R2Settings};

    let bucket = config
        .cache
        .r2_bucket
        .clone()
        .ok_or_else(|| CliError::Unsupported {
            message: "cache.r2_bucket is not set".to_string(),
        })?;
    let settings = R2Settings::from_env(bucket, config.cache.r2_prefix.clone())?;
    Ok(Arc::new(R2CacheStore::new(settings)))
}

#[cfg(not(feature = "r2"))]
#[allow(clippy::unused_async)]
async fn r2_store(_config: &AtlasConfig) -> Result<Arc<dyn CacheStore>, CliError> {
    Err(CliError::Unsupported {
        message: "the r2 cache backend requires building with the `r2` feature".to_string(),
    })
}

/// Builds the result cache selected in `[cache]`.
///
/// # Errors
///
/// See [`cache_store`].
pub async fn result_cache(config: &AtlasConfig) -> Result<ResultCache, CliError> {
    Ok(ResultCache::new(
        cache_store(config).await?,
        config.cache_settings(),
    ))
}

/// Wires the full analysis pipeline.
///
/// # Errors
///
/// Returns [`CliError`] if the warehouse, cache or demographic client
/// cannot be set up.
pub async fn pipeline(config: &AtlasConfig) -> Result<AnalysisPipeline, CliError> {
    let conn = open_warehouse(config)?;
    let resolver = GeoidResolver::new(Arc::new(hierarchy(&conn)?));
    let warehouse = Arc::new(DuckDbWarehouse::new(conn, config.warehouse_timeout()));
    let cache = Arc::new(result_cache(config).await?);

    let mut pipeline = AnalysisPipeline::new(
        resolver,
        QueryComposer::new(config.composer_limits()),
        warehouse,
        cache,
    )
    .with_group_by(config.classification.group_by);

    if config.census.enabled {
        if config.census.api_key.is_none() {
            log::warn!(
                "{} is not set; Census API requests are rate limited",
                config.census.api_key_env
            );
        }
        pipeline = pipeline.with_demographics(Arc::new(AcsClient::new(config.acs_settings())?));
    }

    Ok(pipeline)
}
