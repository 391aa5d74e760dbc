//! Data models for ungridded observations
//!
//! This module contains the station record consumed by ingestion, the
//! metadata block stored per station in the container and the station
//! time series returned by queries.

mod meta;
mod station_data;
mod ts_type;

pub use meta::{MetaValue, StationMeta, VarInfo};
pub use station_data::{StationData, VarTimeSeries};
pub use ts_type::TsType;

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Variable Series
// =============================================================================

/// Observations of one variable at one station
///
/// Values are parallel to the record's `dtime` unless the series carries
/// its own time index. Optional error, flag and value-altitude sequences
/// must have the same length as the values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableSeries {
    /// Own time index, overrides the record's `dtime` when present
    pub time: Option<Vec<DateTime<Utc>>>,

    /// Measured values (NaN = missing)
    pub values: Vec<f64>,

    /// Per-point uncertainty
    pub errors: Option<Vec<f64>>,

    /// Per-point flags (true = invalid)
    pub flags: Option<Vec<bool>>,

    /// Per-point altitude of the measured value
    pub value_altitude: Option<Vec<f64>>,
}

impl VariableSeries {
    /// Create a series aligned with the record's `dtime`
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    /// Create a series with its own time index
    pub fn with_time(time: Vec<DateTime<Utc>>, values: Vec<f64>) -> Self {
        Self {
            time: Some(time),
            values,
            ..Default::default()
        }
    }

    pub fn errors(mut self, errors: Vec<f64>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn flags(mut self, flags: Vec<bool>) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn value_altitude(mut self, value_altitude: Vec<f64>) -> Self {
        self.value_altitude = Some(value_altitude);
        self
    }

    /// Number of points in the series
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// Station Record
// =============================================================================

/// Station record produced by a file reader and consumed by ingestion
///
/// A fixed core (identity, coordinates, time index) plus an open-ended
/// `extra` mapping for reader-specific passthrough metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StationRecord {
    /// Network / dataset identifier (e.g. "AeronetSunV3Lev2.daily")
    pub data_id: String,

    /// Station name as used by the network
    pub station_name: String,

    pub station_id: Option<String>,

    pub instrument_name: Option<String>,

    /// Latitude in decimal degrees (None = unknown)
    pub latitude: Option<f64>,

    /// Longitude in decimal degrees (None = unknown)
    pub longitude: Option<f64>,

    /// Station altitude in m above sea level (None = unknown)
    pub altitude: Option<f64>,

    pub country: Option<String>,

    /// Native sampling frequency of the record
    pub ts_type: Option<TsType>,

    /// Revision of the source data the record was read from
    pub data_revision: Option<String>,

    /// Shared time index of all variables
    pub dtime: Vec<DateTime<Utc>>,

    /// Optional observation stop times, parallel to `dtime`
    pub stop_time: Option<Vec<DateTime<Utc>>>,

    /// Variable time series
    pub variables: BTreeMap<String, VariableSeries>,

    /// Variable metadata (units, frequency)
    pub var_info: BTreeMap<String, VarInfo>,

    /// Reader-specific passthrough attributes
    pub extra: BTreeMap<String, MetaValue>,
}

impl StationRecord {
    /// Create an empty record for a station of a dataset
    pub fn new(data_id: impl Into<String>, station_name: impl Into<String>) -> Self {
        Self {
            data_id: data_id.into(),
            station_name: station_name.into(),
            ..Default::default()
        }
    }

    pub fn with_coordinates(
        mut self,
        latitude: Option<f64>,
        longitude: Option<f64>,
        altitude: Option<f64>,
    ) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self.altitude = altitude;
        self
    }

    pub fn with_dtime(mut self, dtime: Vec<DateTime<Utc>>) -> Self {
        self.dtime = dtime;
        self
    }

    pub fn with_ts_type(mut self, ts_type: TsType) -> Self {
        self.ts_type = Some(ts_type);
        self
    }

    pub fn with_instrument(mut self, instrument_name: impl Into<String>) -> Self {
        self.instrument_name = Some(instrument_name.into());
        self
    }

    pub fn with_station_id(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_data_revision(mut self, revision: impl Into<String>) -> Self {
        self.data_revision = Some(revision.into());
        self
    }

    pub fn with_stop_time(mut self, stop_time: Vec<DateTime<Utc>>) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    /// Add a variable, registering default variable info if none exists
    pub fn with_variable(mut self, name: impl Into<String>, series: VariableSeries) -> Self {
        let name = name.into();
        let ts_type = self.ts_type;
        self.var_info.entry(name.clone()).or_insert_with(|| VarInfo {
            ts_type,
            ..Default::default()
        });
        self.variables.insert(name, series);
        self
    }

    pub fn with_var_info(mut self, name: impl Into<String>, info: VarInfo) -> Self {
        self.var_info.insert(name.into(), info);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Time index used by a variable (own index or the shared `dtime`)
    pub fn time_index(&self, var_name: &str) -> Option<&[DateTime<Utc>]> {
        let series = self.variables.get(var_name)?;
        Some(series.time.as_deref().unwrap_or(&self.dtime))
    }

    /// Validate that every variable's time index and value sequences match
    pub fn validate(&self) -> Result<()> {
        if let Some(stop_time) = &self.stop_time {
            if stop_time.len() != self.dtime.len() {
                return Err(Error::malformed_record(
                    &self.station_name,
                    format!(
                        "stop_time has {} entries but dtime has {}",
                        stop_time.len(),
                        self.dtime.len()
                    ),
                ));
            }
        }

        for (var_name, series) in &self.variables {
            let num_times = series.time.as_ref().map_or(self.dtime.len(), Vec::len);
            let num_values = series.values.len();

            if num_times != num_values {
                return Err(Error::malformed_record(
                    &self.station_name,
                    format!(
                        "variable {} has {} values but its time index has {} entries",
                        var_name, num_values, num_times
                    ),
                ));
            }

            let parallel = [
                ("errors", series.errors.as_ref().map(Vec::len)),
                ("flags", series.flags.as_ref().map(Vec::len)),
                ("value_altitude", series.value_altitude.as_ref().map(Vec::len)),
            ];
            for (name, len) in parallel {
                if let Some(len) = len {
                    if len != num_values {
                        return Err(Error::malformed_record(
                            &self.station_name,
                            format!(
                                "variable {} has {} values but {} {}",
                                var_name, num_values, len, name
                            ),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Build the metadata block for this record
    ///
    /// Only the `extra` keys listed in `add_meta_keys` are copied through;
    /// `None` copies all of them.
    pub fn to_meta(&self, add_meta_keys: Option<&[String]>) -> StationMeta {
        let extra = self
            .extra
            .iter()
            .filter(|(key, _)| add_meta_keys.is_none_or(|keys| keys.contains(key)))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        StationMeta {
            data_id: self.data_id.clone(),
            station_name: self.station_name.clone(),
            station_id: self.station_id.clone(),
            instrument_name: self.instrument_name.clone(),
            latitude: self.latitude.unwrap_or(f64::NAN),
            longitude: self.longitude.unwrap_or(f64::NAN),
            altitude: self.altitude.unwrap_or(f64::NAN),
            country: self.country.clone(),
            ts_type: self.ts_type,
            data_revision: self.data_revision.clone(),
            var_info: BTreeMap::new(),
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn times(n: usize) -> Vec<DateTime<Utc>> {
        (0..n)
            .map(|i| Utc.with_ymd_and_hms(2020, 1, 1 + i as u32, 0, 0, 0).unwrap())
            .collect()
    }

    #[test]
    fn test_validate_accepts_matching_lengths() {
        let record = StationRecord::new("net", "A")
            .with_dtime(times(3))
            .with_variable("od550aer", VariableSeries::new(vec![0.1, 0.2, 0.3]));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_length_mismatch() {
        let record = StationRecord::new("net", "A")
            .with_dtime(times(3))
            .with_variable("od550aer", VariableSeries::new(vec![0.1, 0.2]));
        let err = record.validate().unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
    }

    #[test]
    fn test_validate_rejects_error_length_mismatch() {
        let record = StationRecord::new("net", "A").with_dtime(times(2)).with_variable(
            "od550aer",
            VariableSeries::new(vec![0.1, 0.2]).errors(vec![0.01]),
        );
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_own_time_index_overrides_dtime() {
        let record = StationRecord::new("net", "A").with_dtime(times(3)).with_variable(
            "od550aer",
            VariableSeries::with_time(times(1), vec![0.3]),
        );
        assert!(record.validate().is_ok());
        assert_eq!(record.time_index("od550aer").unwrap().len(), 1);
    }

    #[test]
    fn test_to_meta_unknown_coordinates_are_nan() {
        let record = StationRecord::new("net", "A").with_coordinates(Some(10.0), None, None);
        let meta = record.to_meta(None);
        assert_eq!(meta.latitude, 10.0);
        assert!(meta.longitude.is_nan());
        assert!(meta.altitude.is_nan());
    }

    #[test]
    fn test_to_meta_copies_selected_extra_keys() {
        let record = StationRecord::new("net", "A")
            .with_extra("PI", "Jane Doe")
            .with_extra("filename", "a.nas");
        let meta = record.to_meta(Some(&["PI".to_string()]));
        assert!(meta.extra.contains_key("PI"));
        assert!(!meta.extra.contains_key("filename"));
    }
}
