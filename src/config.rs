//! Configuration management and validation.
//!
//! Provides the explicit configuration passed into container construction,
//! queries and the cache layer. Configuration is layered: built-in defaults,
//! then an optional TOML file, then `UNGRIDDED_*` environment variables, and
//! finally CLI overrides applied by the binary.

use crate::app::services::ungridded::MergePolicy;
use crate::constants::{self, CACHE_DIR_NAME, ENV_PREFIX};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingestion: IngestionConfig,
    pub query: QueryConfig,
    pub outliers: OutlierConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Settings for building containers from station records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Rows pre-allocated per growth step
    pub chunk_size: usize,

    /// Extra metadata keys copied from records (None = all)
    pub add_meta_keys: Option<Vec<String>>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            add_meta_keys: None,
        }
    }
}

impl IngestionConfig {
    /// Set growth chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Restrict the extra metadata keys copied from records
    pub fn with_add_meta_keys(mut self, keys: Vec<String>) -> Self {
        self.add_meta_keys = Some(keys);
        self
    }
}

/// Defaults for station queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Allow wildcard patterns in station names
    pub allow_wildcards_station_name: bool,

    /// Merge blocks sharing a station name into one result
    pub merge_if_multi: bool,

    /// Ranking applied when merging multiple blocks
    pub merge_policy: MergePolicy,

    /// Minimum number of observations per resampling period
    pub min_num_obs: Option<usize>,

    /// Maximum distance for two stations to be considered the same site
    pub max_diff_coords_km: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            allow_wildcards_station_name: true,
            merge_if_multi: true,
            merge_policy: MergePolicy::default(),
            min_num_obs: None,
            max_diff_coords_km: constants::DEFAULT_MAX_DIFF_COORDS_KM,
        }
    }
}

/// Valid value ranges used by outlier removal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Variable -> (minimum, maximum)
    pub ranges: BTreeMap<String, (f64, f64)>,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            ranges: constants::DEFAULT_OUTLIER_RANGES
                .iter()
                .map(|(var, low, high)| (var.to_string(), (*low, *high)))
                .collect(),
        }
    }
}

impl OutlierConfig {
    /// Valid range of a variable
    pub fn range(&self, var_name: &str) -> Option<(f64, f64)> {
        self.ranges.get(var_name).copied()
    }
}

/// On-disk cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding cache files
    pub cache_dir: PathBuf,

    /// Read from and write to the cache
    pub enabled: bool,

    /// Delete cache files found to be stale
    pub delete_stale: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_DIR_NAME);
        Self {
            cache_dir,
            enabled: true,
            delete_stale: true,
        }
    }
}

/// Logging settings (applied by the binary only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,

    /// Timestamped output; compact output when false
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: true,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Default location of the configuration file
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CACHE_DIR_NAME).join("config.toml"))
            .ok_or_else(|| Error::configuration("Could not determine user config directory"))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("Failed to read config file '{}'", path.display()), e)
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::configuration(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Load defaults, then the optional file, then environment overrides
    pub fn load_layered(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `UNGRIDDED_*` overrides using the given variable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(dir) = var("CACHE_DIR") {
            self.cache.cache_dir = PathBuf::from(dir);
        }
        if let Some(enabled) = var("CACHE_ENABLED") {
            self.cache.enabled = parse_bool("CACHE_ENABLED", &enabled)?;
        }
        if let Some(chunk_size) = var("CHUNK_SIZE") {
            self.ingestion.chunk_size = chunk_size.parse().map_err(|_| {
                Error::configuration(format!(
                    "{}CHUNK_SIZE must be a positive integer, got '{}'",
                    ENV_PREFIX, chunk_size
                ))
            })?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.chunk_size == 0 {
            return Err(Error::configuration("chunk_size must be greater than 0"));
        }

        for (var, (low, high)) in &self.outliers.ranges {
            if low.is_nan() || high.is_nan() || low > high {
                return Err(Error::configuration(format!(
                    "Invalid outlier range for {}: [{}, {}]",
                    var, low, high
                )));
            }
        }

        if !(self.query.max_diff_coords_km >= 0.0) {
            return Err(Error::configuration(
                "max_diff_coords_km must be a non-negative number",
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::configuration(format!(
                "Invalid log level '{}', expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{}{} must be a boolean, got '{}'",
            ENV_PREFIX, name, value
        ))),
    }
}
