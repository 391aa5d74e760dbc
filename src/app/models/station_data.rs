//! Per-station time series reconstructed from the container

use super::{StationMeta, VarInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Time-indexed values of one variable
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VarTimeSeries {
    pub time: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
    pub errors: Option<Vec<f64>>,
    pub flags: Option<Vec<bool>>,
}

impl VarTimeSeries {
    pub fn new(time: Vec<DateTime<Utc>>, values: Vec<f64>) -> Self {
        Self {
            time,
            values,
            errors: None,
            flags: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of finite values
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    /// True if the series has no finite value
    pub fn all_nan(&self) -> bool {
        self.valid_count() == 0
    }

    /// Whether timestamps are non-decreasing
    pub fn is_sorted(&self) -> bool {
        self.time.windows(2).all(|w| w[0] <= w[1])
    }

    /// Sort all parallel sequences by time (stable)
    pub fn sort_by_time(&mut self) {
        if self.is_sorted() {
            return;
        }
        let mut order: Vec<usize> = (0..self.time.len()).collect();
        order.sort_by_key(|&i| self.time[i]);
        self.reorder(&order);
    }

    /// Keep only the points at the given positions, in that order
    pub(crate) fn reorder(&mut self, order: &[usize]) {
        self.time = order.iter().map(|&i| self.time[i]).collect();
        self.values = order.iter().map(|&i| self.values[i]).collect();
        if let Some(errors) = &self.errors {
            self.errors = Some(order.iter().map(|&i| errors[i]).collect());
        }
        if let Some(flags) = &self.flags {
            self.flags = Some(order.iter().map(|&i| flags[i]).collect());
        }
    }

    /// Append one point, keeping optional sequences parallel
    pub(crate) fn push_from(&mut self, other: &VarTimeSeries, i: usize) {
        let len = self.len();
        self.time.push(other.time[i]);
        self.values.push(other.values[i]);

        if let Some(src) = &other.errors {
            self.errors
                .get_or_insert_with(|| vec![f64::NAN; len])
                .push(src[i]);
        } else if let Some(errors) = &mut self.errors {
            errors.push(f64::NAN);
        }

        if let Some(src) = &other.flags {
            self.flags.get_or_insert_with(|| vec![false; len]).push(src[i]);
        } else if let Some(flags) = &mut self.flags {
            flags.push(false);
        }
    }
}

/// Station time series reconstructed from one or more metadata blocks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StationData {
    /// Station metadata; `var_info` only lists the returned variables
    pub meta: StationMeta,

    /// Metadata blocks the data was taken from, highest ranked first
    pub meta_indices: Vec<usize>,

    /// Variable name -> time series
    pub series: BTreeMap<String, VarTimeSeries>,

    /// Values of lower-ranked blocks displaced on overlapping timestamps
    pub overlap: BTreeMap<String, VarTimeSeries>,
}

impl StationData {
    pub fn station_name(&self) -> &str {
        &self.meta.station_name
    }

    /// Names of the variables with data
    pub fn variables(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    pub fn var_info(&self, var_name: &str) -> Option<&VarInfo> {
        self.meta.var_info.get(var_name)
    }

    /// Whether merging found duplicate timestamps for a variable
    pub fn has_overlap(&self, var_name: &str) -> bool {
        self.overlap.get(var_name).is_some_and(|s| !s.is_empty())
    }

    /// Total number of finite values across all variables
    pub fn num_valid(&self) -> usize {
        self.series.values().map(VarTimeSeries::valid_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sort_by_time_keeps_parallel_sequences() {
        let t = |d| Utc.with_ymd_and_hms(2020, 1, d, 0, 0, 0).unwrap();
        let mut series = VarTimeSeries::new(vec![t(3), t(1), t(2)], vec![3.0, 1.0, 2.0]);
        series.errors = Some(vec![0.3, 0.1, 0.2]);
        series.sort_by_time();

        assert_eq!(series.time, vec![t(1), t(2), t(3)]);
        assert_eq!(series.values, vec![1.0, 2.0, 3.0]);
        assert_eq!(series.errors, Some(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn test_valid_count_and_all_nan() {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let series = VarTimeSeries::new(vec![t, t], vec![f64::NAN, 1.0]);
        assert_eq!(series.valid_count(), 1);
        assert!(!series.all_nan());

        let empty = VarTimeSeries::new(vec![t], vec![f64::NAN]);
        assert!(empty.all_nan());
    }
}
