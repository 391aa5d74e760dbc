//! Application constants for the ungridded observation container
//!
//! This module contains the flat array layout, version identifiers,
//! default values and lookup tables used throughout the library.

// =============================================================================
// Version Identifiers
// =============================================================================

/// Schema version of the serialized container (part of the cache key)
pub const UNGRIDDED_DATA_VERSION: &str = "0.22";

/// Version of the cache file writer
pub const CACHE_WRITER_VERSION: &str = "1.1";

/// Library version recorded in cache headers
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Flat Data Array Layout
// =============================================================================

/// Column positions of the flat data array
///
/// Every row of the array is one (metadata block, variable, timestamp)
/// observation. Columns are addressed by position only.
pub mod columns {
    /// Metadata block index the row belongs to
    pub const META_IDX: usize = 0;
    /// Observation (start) time in epoch seconds
    pub const TIME: usize = 1;
    pub const LATITUDE: usize = 2;
    pub const LONGITUDE: usize = 3;
    pub const ALTITUDE: usize = 4;
    /// Variable index from the variable index table
    pub const VAR_IDX: usize = 5;
    pub const VALUE: usize = 6;
    /// Altitude of the measured value (profiles)
    pub const VALUE_ALTITUDE: usize = 7;
    pub const ERROR: usize = 8;
    pub const FLAG: usize = 9;
    /// Observation stop time in epoch seconds
    pub const STOP_TIME: usize = 10;
    /// Scratch column holding values displaced by outlier removal
    pub const TRASH: usize = 11;

    /// Total number of columns
    pub const COUNT: usize = 12;

    /// Column names in positional order (used for exports)
    pub const NAMES: [&str; COUNT] = [
        "meta_idx",
        "time",
        "latitude",
        "longitude",
        "altitude",
        "var_idx",
        "value",
        "value_altitude",
        "error",
        "flag",
        "stop_time",
        "trash",
    ];
}

/// Default number of rows pre-allocated per growth chunk
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

/// Flag column value marking an invalid data point
pub const FLAG_INVALID: f64 = 1.0;

// =============================================================================
// Metadata Keys
// =============================================================================

/// Fixed metadata keys available on every metadata block
pub mod meta_keys {
    pub const DATA_ID: &str = "data_id";
    pub const STATION_NAME: &str = "station_name";
    pub const STATION_ID: &str = "station_id";
    pub const INSTRUMENT_NAME: &str = "instrument_name";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const ALTITUDE: &str = "altitude";
    pub const COUNTRY: &str = "country";
    pub const TS_TYPE: &str = "ts_type";
    pub const DATA_REVISION: &str = "data_revision";
    /// Virtual key matching the variables listed in `var_info`
    pub const VARIABLES: &str = "variables";

    pub const ALL: &[&str] = &[
        DATA_ID,
        STATION_NAME,
        STATION_ID,
        INSTRUMENT_NAME,
        LATITUDE,
        LONGITUDE,
        ALTITUDE,
        COUNTRY,
        TS_TYPE,
        DATA_REVISION,
        VARIABLES,
    ];
}

/// Relative tolerance for numeric metadata comparison
pub const META_NUMERIC_RTOL: f64 = 1e-2;

// =============================================================================
// Query Defaults
// =============================================================================

/// Default maximum distance in km for two stations to be considered co-located
pub const DEFAULT_MAX_DIFF_COORDS_KM: f64 = 10.0;

/// Mean Earth radius in km used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// =============================================================================
// Outlier Ranges
// =============================================================================

/// Default valid value ranges `(variable, minimum, maximum)`
///
/// Used by `remove_outliers` when no explicit range is supplied.
pub const DEFAULT_OUTLIER_RANGES: &[(&str, f64, f64)] = &[
    ("od550aer", -1.0, 10.0),
    ("od440aer", -1.0, 10.0),
    ("od870aer", -1.0, 10.0),
    ("ang4487aer", -4.0, 6.0),
    ("abs550aer", -1.0, 5.0),
    ("sc550aer", -10.0, 1000.0),
    ("ac550aer", -10.0, 1000.0),
    ("concpm10", -1.0, 5000.0),
    ("concpm25", -1.0, 5000.0),
    ("vmro3", -1.0, 500.0),
];

// =============================================================================
// Regions
// =============================================================================

/// Default rectangular regions `(name, lat_low, lat_high, lon_low, lon_high)`
pub const DEFAULT_REGIONS: &[(&str, f64, f64, f64, f64)] = &[
    ("WORLD", -90.0, 90.0, -180.0, 180.0),
    ("EUROPE", 30.0, 80.0, -20.0, 70.0),
    ("NAMERICA", 10.0, 80.0, -170.0, -20.0),
    ("SAMERICA", -60.0, 20.0, -105.0, -30.0),
    ("AFRICA", -40.0, 40.0, -20.0, 50.0),
    ("ASIA", 0.0, 80.0, 45.0, 180.0),
    ("AUSTRALIA", -50.0, -10.0, 110.0, 180.0),
    ("NHEMISPHERE", 0.0, 90.0, -180.0, 180.0),
    ("SHEMISPHERE", -90.0, 0.0, -180.0, 180.0),
];

// =============================================================================
// Cache
// =============================================================================

/// File extension of cache files
pub const CACHE_FILE_EXTENSION: &str = "bin";

/// Application directory name below the user cache directory
pub const CACHE_DIR_NAME: &str = "ungridded_obs";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "UNGRIDDED_";
