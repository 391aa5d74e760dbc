//! Ungridded observation container
//!
//! This module provides [`UngriddedData`], a point-cloud container holding all
//! station/variable/time observations of one or more datasets in one flat
//! numeric array plus three index tables:
//!
//! - **metadata**: metadata block index -> station-level attributes
//! - **meta_idx**: metadata block index -> variable -> row positions in the array
//! - **var_idx**: variable name -> integer stored in the array's variable column
//!
//! # Architecture
//!
//! The implementation is split by concern:
//! - [`ingestion`] - Building the container from station records (chunked growth)
//! - [`query`] - Reconstructing station time series, multi-match merging
//! - [`filter`] - Metadata predicate filtering
//! - [`region`] - Rectangular region, raster mask and country filtering
//! - [`transform`] - Variable extraction, outlier removal, flag masking
//! - [`merge`] - Merging containers and coalescing common metadata
//! - [`export`] - Long-format DataFrame export
//!
//! # Operation families
//!
//! Methods taking `&self` never modify the container and return a new one.
//! In-place variants take `&mut self` and carry an `_in_place` suffix (or are
//! inherently mutating such as [`UngriddedData::append`]).
//! [`UngriddedData::filter_by_country`] takes `&mut self` only to store
//! looked-up countries on the metadata blocks; it returns a new container
//! like the other filters. Every successful
//! filter/transform/merge appends one entry to the filter history.
//!
//! # Example Usage
//!
//! ```rust
//! use ungridded_obs::app::services::ungridded::{MetaFilter, Predicate, QueryOptions};
//! use ungridded_obs::config::IngestionConfig;
//! use ungridded_obs::{StationRecord, UngriddedData};
//! # use ungridded_obs::app::models::VariableSeries;
//! # use chrono::{TimeZone, Utc};
//!
//! # fn example() -> ungridded_obs::Result<()> {
//! let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
//! let record = StationRecord::new("AeronetSunV3Lev2.daily", "Leipzig")
//!     .with_coordinates(Some(51.35), Some(12.43), Some(125.0))
//!     .with_dtime(vec![t0])
//!     .with_variable("od550aer", VariableSeries::new(vec![0.12]));
//!
//! let data = UngriddedData::from_station_data(&[record], &IngestionConfig::default())?;
//! let subset = data.filter_by_meta(
//!     &MetaFilter::new().with("latitude", Predicate::range(40.0, 60.0)),
//! )?;
//! let station = subset.to_station_data_by_name("Leipzig", &["od550aer"], &QueryOptions::default())?;
//! assert_eq!(station.series["od550aer"].len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod filter;
pub mod ingestion;
pub mod merge;
pub mod query;
pub mod region;
pub mod transform;

#[cfg(test)]
pub mod tests;

pub use filter::{FilterSpec, MetaFilter, Predicate};
pub use query::{
    FailedFetch, MergePolicy, QueryOptions, RankCriterion, StationDataCollection,
    StationSelector,
};
pub use region::{RasterMask, Region, RegionMask, ReverseGeocoder, haversine_km};

use crate::app::models::{MetaValue, StationMeta, TsType};
use crate::constants::{self, columns};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use tracing::debug;

/// Row positions of one metadata block, per variable
pub type VarRows = BTreeMap<String, Vec<usize>>;

/// One entry of the append-only filter history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterHistoryEntry {
    pub applied_at: DateTime<Utc>,
    pub description: String,
}

/// Point-cloud container for ungridded observations
///
/// See the [module documentation](self) for the storage layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UngriddedData {
    /// Flat data array, one row per observation, columns per [`columns`]
    pub(crate) data: Array2<f64>,

    /// Metadata block index -> station metadata
    pub(crate) metadata: BTreeMap<usize, StationMeta>,

    /// Metadata block index -> variable -> row positions
    pub(crate) meta_idx: BTreeMap<usize, VarRows>,

    /// Variable name -> variable index
    pub(crate) var_idx: BTreeMap<String, usize>,

    /// Dataset id -> data revision
    pub(crate) data_revision: BTreeMap<String, String>,

    /// Applied filter / transform operations
    pub(crate) filter_hist: Vec<FilterHistoryEntry>,

    /// Rows added per growth step during ingestion
    pub(crate) chunk_size: usize,
}

impl Default for UngriddedData {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a timestamp to the epoch seconds stored in the time columns
///
/// Fractional seconds keep microsecond resolution.
pub(crate) fn to_epoch(time: &DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1e6
}

/// Convert epoch seconds from the time columns back to a timestamp
pub(crate) fn from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((seconds * 1e6).round() as i64)
}

impl UngriddedData {
    /// Create an empty container
    pub fn new() -> Self {
        Self::with_chunk_size(constants::DEFAULT_CHUNK_SIZE)
    }

    /// Create an empty container with a custom growth chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            data: Array2::from_elem((0, columns::COUNT), f64::NAN),
            metadata: BTreeMap::new(),
            meta_idx: BTreeMap::new(),
            var_idx: BTreeMap::new(),
            data_revision: BTreeMap::new(),
            filter_hist: Vec::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Create an empty container sharing this one's settings and provenance
    pub(crate) fn empty_like(&self) -> Self {
        let mut new = Self::with_chunk_size(self.chunk_size);
        new.data_revision = self.data_revision.clone();
        new.filter_hist = self.filter_hist.clone();
        new
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Schema version of the container (part of cache identity)
    pub fn version() -> &'static str {
        constants::UNGRIDDED_DATA_VERSION
    }

    /// Shape of the flat data array (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// True if the container holds no observation
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Read-only view of the flat data array
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn metadata(&self) -> &BTreeMap<usize, StationMeta> {
        &self.metadata
    }

    pub fn meta_idx(&self) -> &BTreeMap<usize, VarRows> {
        &self.meta_idx
    }

    pub fn var_idx(&self) -> &BTreeMap<String, usize> {
        &self.var_idx
    }

    pub fn data_revision(&self) -> &BTreeMap<String, String> {
        &self.data_revision
    }

    pub fn filter_history(&self) -> &[FilterHistoryEntry] {
        &self.filter_hist
    }

    /// Whether any filter or transform was applied
    pub fn is_filtered(&self) -> bool {
        !self.filter_hist.is_empty()
    }

    /// Number of metadata blocks
    pub fn num_meta_blocks(&self) -> usize {
        self.metadata.len()
    }

    /// Highest metadata block index in use
    pub fn last_meta_idx(&self) -> Option<usize> {
        self.metadata.keys().next_back().copied()
    }

    /// Variables with at least one row
    pub fn contains_vars(&self) -> Vec<String> {
        self.var_idx.keys().cloned().collect()
    }

    /// Dataset ids of all metadata blocks
    pub fn contains_datasets(&self) -> Vec<String> {
        let ids: BTreeSet<&str> = self.metadata.values().map(|m| m.data_id.as_str()).collect();
        ids.into_iter().map(str::to_string).collect()
    }

    /// Instrument names of all metadata blocks
    pub fn contains_instruments(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .metadata
            .values()
            .filter_map(|m| m.instrument_name.as_deref())
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// Station name of every metadata block, in block order
    pub fn station_names(&self) -> Vec<String> {
        self.metadata
            .values()
            .map(|m| m.station_name.clone())
            .collect()
    }

    /// Sorted unique station names
    pub fn unique_station_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .metadata
            .values()
            .map(|m| m.station_name.as_str())
            .collect();
        names.into_iter().map(str::to_string).collect()
    }

    /// Countries available in the metadata blocks
    pub fn countries_available(&self) -> Vec<String> {
        let countries: BTreeSet<&str> = self
            .metadata
            .values()
            .filter_map(|m| m.country.as_deref())
            .collect();
        countries.into_iter().map(str::to_string).collect()
    }

    /// Station coordinates (latitude, longitude, altitude) per metadata block
    pub fn station_coordinates(&self) -> BTreeMap<usize, (f64, f64, f64)> {
        self.metadata
            .iter()
            .map(|(idx, meta)| (*idx, meta.coordinates()))
            .collect()
    }

    /// Distinct values of a metadata attribute
    pub fn unique_meta_values(&self, key: &str) -> Vec<MetaValue> {
        let mut values: Vec<MetaValue> = Vec::new();
        for value in self.metadata.values().filter_map(|m| m.get(key)) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }

    /// Row positions of a variable across all blocks, in block order
    pub(crate) fn rows_of_var(&self, var_name: &str) -> Vec<usize> {
        self.meta_idx
            .values()
            .filter_map(|vars| vars.get(var_name))
            .flat_map(|rows| rows.iter().copied())
            .collect()
    }

    /// All values of a variable (NaN included)
    pub fn all_datapoints_var(&self, var_name: &str) -> Result<Vec<f64>> {
        if !self.var_idx.contains_key(var_name) {
            return Err(Error::variable_not_available(var_name));
        }
        Ok(self
            .rows_of_var(var_name)
            .into_iter()
            .map(|row| self.data[[row, columns::VALUE]])
            .collect())
    }

    /// Number of finite values of a variable
    pub fn num_obs_var_valid(&self, var_name: &str) -> Result<usize> {
        Ok(self
            .all_datapoints_var(var_name)?
            .into_iter()
            .filter(|v| v.is_finite())
            .count())
    }

    /// First and last observation time in the container
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let times = self.data.column(columns::TIME);
        let (min, max) = times
            .iter()
            .filter(|t| t.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| {
                (lo.min(t), hi.max(t))
            });
        Some((from_epoch(min)?, from_epoch(max)?))
    }

    /// Sampling frequencies declared for a variable across blocks
    pub fn ts_types_var(&self, var_name: &str) -> Vec<TsType> {
        let types: BTreeSet<TsType> = self
            .metadata
            .values()
            .filter_map(|m| m.var_info.get(var_name))
            .filter_map(|info| info.ts_type)
            .collect();
        types.into_iter().collect()
    }

    /// Check that every block declaring the variable uses the given units
    pub fn check_unit(&self, var_name: &str, unit: &str) -> Result<()> {
        if !self.var_idx.contains_key(var_name) {
            return Err(Error::variable_not_available(var_name));
        }
        for meta in self.metadata.values() {
            if let Some(found) = meta.var_info.get(var_name).and_then(|i| i.units.as_deref()) {
                if found != unit {
                    return Err(Error::UnitMismatch {
                        var_name: var_name.to_string(),
                        expected: unit.to_string(),
                        found: found.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Metadata block indices whose station name matches
    ///
    /// With `allow_wildcards`, `*`/`?`/`[..]` patterns are supported.
    pub fn find_station_meta_indices(
        &self,
        station_name: &str,
        allow_wildcards: bool,
    ) -> Result<Vec<usize>> {
        let pattern = if allow_wildcards && filter::has_wildcard(station_name) {
            Some(filter::compile_pattern("station_name", station_name)?)
        } else {
            None
        };

        let indices: Vec<usize> = self
            .metadata
            .iter()
            .filter(|(_, meta)| match &pattern {
                Some(p) => p.matches(&meta.station_name),
                None => meta.station_name == station_name,
            })
            .map(|(idx, _)| *idx)
            .collect();

        if indices.is_empty() {
            return Err(Error::station_not_found(station_name));
        }
        Ok(indices)
    }

    /// Append an entry to the filter history
    pub(crate) fn add_history(&mut self, description: impl Into<String>) {
        let description = description.into();
        debug!("Filter history: {}", description);
        self.filter_hist.push(FilterHistoryEntry {
            applied_at: Utc::now(),
            description,
        });
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    /// Verify the mutual consistency of the array and index tables
    ///
    /// Checks that every listed row exists and carries the block's metadata
    /// index and the variable's index, that no row is listed twice, that no
    /// populated row is orphaned and that the variable index table is a
    /// bijection onto the values of the variable column.
    pub fn check_index(&self) -> Result<()> {
        let nrows = self.data.nrows();
        if self.data.ncols() != columns::COUNT {
            return Err(Error::consistency(format!(
                "data array has {} columns, expected {}",
                self.data.ncols(),
                columns::COUNT
            )));
        }

        let meta_keys: BTreeSet<&usize> = self.metadata.keys().collect();
        let index_keys: BTreeSet<&usize> = self.meta_idx.keys().collect();
        if meta_keys != index_keys {
            return Err(Error::consistency(
                "metadata and row index tables have different block indices",
            ));
        }

        let mut seen = vec![false; nrows];
        for (meta_key, vars) in &self.meta_idx {
            let meta = &self.metadata[meta_key];
            for (var_name, rows) in vars {
                let var_num = self.var_idx.get(var_name).ok_or_else(|| {
                    Error::consistency(format!(
                        "variable {} of block {} missing from variable index table",
                        var_name, meta_key
                    ))
                })?;
                if !meta.var_info.contains_key(var_name) {
                    return Err(Error::consistency(format!(
                        "variable {} of block {} missing from var_info",
                        var_name, meta_key
                    )));
                }

                for &row in rows {
                    if row >= nrows {
                        return Err(Error::consistency(format!(
                            "row {} of block {} / {} out of bounds ({} rows)",
                            row, meta_key, var_name, nrows
                        )));
                    }
                    if std::mem::replace(&mut seen[row], true) {
                        return Err(Error::consistency(format!(
                            "row {} is referenced more than once",
                            row
                        )));
                    }
                    if self.data[[row, columns::META_IDX]] != *meta_key as f64 {
                        return Err(Error::consistency(format!(
                            "row {} has metadata index {} but is listed under block {}",
                            row,
                            self.data[[row, columns::META_IDX]],
                            meta_key
                        )));
                    }
                    if self.data[[row, columns::VAR_IDX]] != *var_num as f64 {
                        return Err(Error::consistency(format!(
                            "row {} has variable index {} but is listed under {} ({})",
                            row,
                            self.data[[row, columns::VAR_IDX]],
                            var_name,
                            var_num
                        )));
                    }
                }
            }
        }

        let mut used = BTreeSet::new();
        for (row, value) in self.data.column(columns::VAR_IDX).iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            if !seen[row] {
                return Err(Error::consistency(format!(
                    "row {} is not referenced by the row index table",
                    row
                )));
            }
            used.insert(*value as usize);
        }

        let table: BTreeSet<usize> = self.var_idx.values().copied().collect();
        if table.len() != self.var_idx.len() || table != used {
            return Err(Error::consistency(format!(
                "variable index table {:?} does not match variable column values {:?}",
                self.var_idx, used
            )));
        }

        Ok(())
    }

    /// Compare array, index tables and metadata (filter history excluded)
    pub fn same_content(&self, other: &UngriddedData) -> bool {
        if self.shape() != other.shape()
            || self.var_idx != other.var_idx
            || self.meta_idx != other.meta_idx
            || self.metadata.len() != other.metadata.len()
        {
            return false;
        }

        let data_equal = self
            .data
            .iter()
            .zip(other.data.iter())
            .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()));

        data_equal
            && self
                .metadata
                .iter()
                .zip(other.metadata.iter())
                .all(|((ka, a), (kb, b))| {
                    ka == kb && a.var_info == b.var_info && a.same_as(b, &[], 0.0)
                })
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize the whole container (array, tables, metadata, history)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| Error::serialization("Failed to serialize container", e))
    }

    /// Deserialize a container and verify its consistency
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let data: Self = bincode::deserialize(bytes)
            .map_err(|e| Error::serialization("Failed to deserialize container", e))?;
        data.check_index()?;
        Ok(data)
    }

    /// Serialize the container into a writer
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, self)
            .map_err(|e| Error::serialization("Failed to write container", e))
    }

    /// Deserialize a container from a reader and verify its consistency
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let data: Self = bincode::deserialize_from(reader)
            .map_err(|e| Error::serialization("Failed to read container", e))?;
        data.check_index()?;
        Ok(data)
    }
}
