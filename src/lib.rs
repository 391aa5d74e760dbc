//! Ungridded Observation Library
//!
//! A Rust library for harmonizing ungridded atmospheric observations (station
//! time series from ground networks, lidars, sun photometers, ...) into one
//! common in-memory point cloud that can be filtered, merged, cached and
//! queried back into per-station time series.
//!
//! This library provides tools for:
//! - Ingesting station records produced by network-specific readers
//! - Storing every observation in one flat numeric array with a metadata index
//! - Reconstructing per-station time series with time windows and resampling
//! - Filtering by metadata predicates, regions, countries and raster masks
//! - Extracting variables, removing outliers and masking flagged points
//! - Merging containers and coalescing near-identical metadata blocks
//! - Persisting containers in a version-checked on-disk cache

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod models;
    pub mod services {
        pub mod cache_handler;
        pub mod reader;
        pub mod resample;
        pub mod ungridded;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::models::{MetaValue, StationData, StationMeta, StationRecord, TsType, VarInfo};
pub use app::services::ungridded::UngriddedData;
pub use config::Config;

/// Result type alias for ungridded data operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ingestion, query, filter and cache operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Station record cannot be ingested (length mismatch between index and values)
    #[error("Malformed station record '{station}': {message}")]
    MalformedRecord { station: String, message: String },

    /// Requested station/variable/time window yields no data
    #[error("No data coverage: {message}")]
    DataCoverage { message: String },

    /// Requested variable was never ingested into this container
    #[error("Variable not available: {var_name}")]
    VariableNotAvailable { var_name: String },

    /// No metadata block matches the requested station
    #[error("Station not found: {station}")]
    StationNotFound { station: String },

    /// Several metadata blocks match a station and merging is disabled
    #[error("Station '{station}' matches {count} metadata blocks and merging is disabled")]
    AmbiguousStation { station: String, count: usize },

    /// Filter key does not exist in any metadata block
    #[error("Invalid filter key '{key}': not available in any metadata block")]
    InvalidFilterKey { key: String },

    /// Filter value cannot be interpreted
    #[error("Invalid filter for key '{key}': {message}")]
    InvalidFilter { key: String, message: String },

    /// Outliers were already moved to the trash column for this variable
    #[error("Trash column for variable '{var_name}' is not empty, call empty_trash first")]
    TrashNotEmpty { var_name: String },

    /// No flag information available in the container
    #[error("Container does not contain flagged data points")]
    NoFlagData,

    /// Variable units differ from the expected ones
    #[error("Unit mismatch for variable '{var_name}': expected {expected}, found {found}")]
    UnitMismatch {
        var_name: String,
        expected: String,
        found: String,
    },

    /// Internal invariant violated (bug in the engine)
    #[error("Consistency check failed: {message}")]
    Consistency { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Container could not be (de)serialized
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Box<bincode::ErrorKind>,
    },

    /// DataFrame export failed
    #[error("Export error: {message}")]
    Export {
        message: String,
        #[source]
        source: polars::error::PolarsError,
    },
}

impl Error {
    /// Create a malformed record error
    pub fn malformed_record(station: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            station: station.into(),
            message: message.into(),
        }
    }

    /// Create a data coverage error
    pub fn data_coverage(message: impl Into<String>) -> Self {
        Self::DataCoverage {
            message: message.into(),
        }
    }

    /// Create a variable not available error
    pub fn variable_not_available(var_name: impl Into<String>) -> Self {
        Self::VariableNotAvailable {
            var_name: var_name.into(),
        }
    }

    /// Create a station not found error
    pub fn station_not_found(station: impl Into<String>) -> Self {
        Self::StationNotFound {
            station: station.into(),
        }
    }

    /// Create an invalid filter key error
    pub fn invalid_filter_key(key: impl Into<String>) -> Self {
        Self::InvalidFilterKey { key: key.into() }
    }

    /// Create an invalid filter error
    pub fn invalid_filter(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a serialization error with context
    pub fn serialization(message: impl Into<String>, source: Box<bincode::ErrorKind>) -> Self {
        Self::Serialization {
            message: message.into(),
            source,
        }
    }

    /// Create an export error with context
    pub fn export(message: impl Into<String>, source: polars::error::PolarsError) -> Self {
        Self::Export {
            message: message.into(),
            source,
        }
    }

    /// Whether bulk operations may log this error and continue
    ///
    /// Coverage, availability and station lookup conditions are expected
    /// during bulk retrieval. Malformed input and unit mismatches are errors
    /// of the data itself, and consistency failures indicate a bug.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DataCoverage { .. }
                | Self::VariableNotAvailable { .. }
                | Self::StationNotFound { .. }
                | Self::AmbiguousStation { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(error: Box<bincode::ErrorKind>) -> Self {
        Self::Serialization {
            message: "bincode (de)serialization failed".to_string(),
            source: error,
        }
    }
}

impl From<polars::error::PolarsError> for Error {
    fn from(error: polars::error::PolarsError) -> Self {
        Self::Export {
            message: "DataFrame construction failed".to_string(),
            source: error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(Error::data_coverage("no data").is_recoverable());
        assert!(Error::variable_not_available("od550aer").is_recoverable());
        assert!(Error::station_not_found("Ispra").is_recoverable());

        assert!(!Error::malformed_record("Ispra", "length mismatch").is_recoverable());
        assert!(
            !Error::UnitMismatch {
                var_name: "od550aer".to_string(),
                expected: "1".to_string(),
                found: "m-1".to_string(),
            }
            .is_recoverable()
        );
        assert!(!Error::consistency("broken index").is_recoverable());
    }
}
