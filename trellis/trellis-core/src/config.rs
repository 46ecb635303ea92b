//! Configuration for an embedded Trellis instance.
//!
//! Configuration is read from a TOML file and may be overridden through
//! `TRELLIS_*` environment variables:
//!
//! ```toml
//! [logging]
//! level = "info"
//! json = false
//!
//! [cache]
//! capacity = 1000
//! evict_count = 100
//!
//! [traversal]
//! hydration_batch = 10
//!
//! [vector]
//! default_threshold = 100
//! ```
//!
//! # Example
//!
//! ```no_run
//! use trellis_core::config::TrellisConfig;
//!
//! # fn example() -> trellis_core::Result<()> {
//! let config = TrellisConfig::load("trellis.toml")?.apply_env_overrides()?;
//! config.validate()?;
//! println!("cache capacity: {}", config.cache.capacity);
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, TrellisError};
use crate::types::enumeration::{MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENV_LOG_LEVEL: &str = "TRELLIS_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "TRELLIS_LOG_JSON";
pub const ENV_CACHE_CAPACITY: &str = "TRELLIS_CACHE_CAPACITY";
pub const ENV_CACHE_EVICT_COUNT: &str = "TRELLIS_CACHE_EVICT_COUNT";
pub const ENV_HYDRATION_BATCH: &str = "TRELLIS_HYDRATION_BATCH";
pub const ENV_INDEX_DIR: &str = "TRELLIS_INDEX_DIR";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub traversal: TraversalConfig,
    pub enumeration: EnumerationConfig,
    pub vector: VectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Reference cache sizing. Applies to each of the tenant, graph, node and
/// edge caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    /// Entries evicted at once when the cache is full
    pub evict_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1000,
            evict_count: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Pending neighbor ids hydrated per batch during subgraph extraction
    pub hydration_batch: usize,
    /// Route length cap applied when a request does not set one
    pub default_route_depth: Option<usize>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            hydration_batch: 10,
            default_route_depth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerationConfig {
    pub default_page_size: usize,
    /// Page size used by streaming reads
    pub stream_page_size: usize,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            stream_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub default_m: usize,
    pub default_ef: usize,
    pub default_ef_construction: usize,
    pub default_threshold: usize,
    /// Directory for file-backed indexes configured without an explicit path
    pub index_dir: Option<PathBuf>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            default_m: 16,
            default_ef: 50,
            default_ef_construction: 200,
            default_threshold: 100,
            index_dir: None,
        }
    }
}

impl TrellisConfig {
    /// Read configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| TrellisError::config(format!("invalid TOML: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TrellisError::config(format!("failed to serialize: {}", e)))
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env_overrides()
    }

    /// Apply `TRELLIS_*` environment overrides.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            debug!("Overriding log level from environment: {}", level);
            self.logging.level = level;
        }
        if let Some(json) = lookup(ENV_LOG_JSON) {
            self.logging.json = parse_env(ENV_LOG_JSON, &json)?;
        }
        if let Some(capacity) = lookup(ENV_CACHE_CAPACITY) {
            self.cache.capacity = parse_env(ENV_CACHE_CAPACITY, &capacity)?;
        }
        if let Some(evict) = lookup(ENV_CACHE_EVICT_COUNT) {
            self.cache.evict_count = parse_env(ENV_CACHE_EVICT_COUNT, &evict)?;
        }
        if let Some(batch) = lookup(ENV_HYDRATION_BATCH) {
            self.traversal.hydration_batch = parse_env(ENV_HYDRATION_BATCH, &batch)?;
        }
        if let Some(dir) = lookup(ENV_INDEX_DIR) {
            self.vector.index_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.enabled {
            if self.cache.capacity == 0 {
                return Err(TrellisError::config("cache capacity must be greater than zero"));
            }
            if self.cache.evict_count == 0 || self.cache.evict_count > self.cache.capacity {
                return Err(TrellisError::config(
                    "cache evict_count must be between 1 and the cache capacity",
                ));
            }
        }
        if self.traversal.hydration_batch == 0 {
            return Err(TrellisError::config("traversal hydration_batch must be greater than zero"));
        }
        if self.traversal.default_route_depth == Some(0) {
            return Err(TrellisError::config("traversal default_route_depth must be at least 1"));
        }
        for (name, size) in [
            ("default_page_size", self.enumeration.default_page_size),
            ("stream_page_size", self.enumeration.stream_page_size),
        ] {
            if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&size) {
                return Err(TrellisError::config(format!(
                    "enumeration {} must be between {} and {}",
                    name, MIN_PAGE_SIZE, MAX_PAGE_SIZE
                )));
            }
        }
        if self.vector.default_m == 0
            || self.vector.default_ef == 0
            || self.vector.default_ef_construction == 0
        {
            return Err(TrellisError::config("vector HNSW defaults must be greater than zero"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TrellisError::config(format!("invalid value '{}' for {}", raw, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrellisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.cache.evict_count, 100);
        assert_eq!(config.traversal.hydration_batch, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TrellisConfig::from_toml("[cache]\ncapacity = 50\nevict_count = 5\n").unwrap();
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = TrellisConfig::default();
        config.traversal.default_route_depth = Some(6);
        let raw = config.to_toml().unwrap();
        assert_eq!(TrellisConfig::from_toml(&raw).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_LOG_LEVEL, "debug"),
            (ENV_LOG_JSON, "true"),
            (ENV_CACHE_CAPACITY, "64"),
            (ENV_CACHE_EVICT_COUNT, "8"),
        ]
        .into_iter()
        .collect();

        let config = TrellisConfig::default()
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(config.cache.evict_count, 8);
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let result = TrellisConfig::default()
            .apply_overrides(|k| (k == ENV_CACHE_CAPACITY).then(|| "lots".to_string()));
        assert!(matches!(result, Err(TrellisError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_bad_cache() {
        let mut config = TrellisConfig::default();
        config.cache.evict_count = 2000;
        assert!(config.validate().is_err());

        config.cache.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();
        let config = TrellisConfig::load(&path).unwrap();
        assert_eq!(config.logging.level, "warn");
    }
}
