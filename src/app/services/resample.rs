//! Temporal resampling of station time series
//!
//! The query engine only decides which points are fed into resampling; the
//! aggregation itself lives behind the [`Resampler`] trait so callers can
//! plug in their own implementation.

use crate::app::models::{TsType, VarTimeSeries};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Aggregation applied to the points of one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleHow {
    #[default]
    Mean,
    Median,
    Min,
    Max,
}

impl ResampleHow {
    /// Aggregate finite values (None if there are none)
    fn aggregate(&self, values: &mut [f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        match self {
            ResampleHow::Mean => Some(values.iter().sum::<f64>() / n as f64),
            ResampleHow::Median => {
                values.sort_by(f64::total_cmp);
                if n % 2 == 1 {
                    Some(values[n / 2])
                } else {
                    Some((values[n / 2 - 1] + values[n / 2]) / 2.0)
                }
            }
            ResampleHow::Min => values.iter().copied().reduce(f64::min),
            ResampleHow::Max => values.iter().copied().reduce(f64::max),
        }
    }
}

impl fmt::Display for ResampleHow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResampleHow::Mean => "mean",
            ResampleHow::Median => "median",
            ResampleHow::Min => "min",
            ResampleHow::Max => "max",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ResampleHow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(ResampleHow::Mean),
            "median" => Ok(ResampleHow::Median),
            "min" => Ok(ResampleHow::Min),
            "max" => Ok(ResampleHow::Max),
            other => Err(Error::configuration(format!(
                "Unknown resampling aggregate '{}'",
                other
            ))),
        }
    }
}

/// Resamples a time series to a coarser frequency
pub trait Resampler {
    /// Aggregate `series` into periods of `to`
    ///
    /// Periods with fewer than `min_num_obs` finite values become NaN.
    fn resample(
        &self,
        series: &VarTimeSeries,
        to: TsType,
        min_num_obs: Option<usize>,
    ) -> Result<VarTimeSeries>;
}

/// Period aggregation resampler (mean by default)
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanResampler {
    how: ResampleHow,
}

impl MeanResampler {
    pub fn new(how: ResampleHow) -> Self {
        Self { how }
    }

    pub fn how(&self) -> ResampleHow {
        self.how
    }
}

impl Resampler for MeanResampler {
    fn resample(
        &self,
        series: &VarTimeSeries,
        to: TsType,
        min_num_obs: Option<usize>,
    ) -> Result<VarTimeSeries> {
        let mut periods: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
        for (time, value) in series.time.iter().zip(&series.values) {
            let bucket = periods.entry(to.floor(*time)).or_default();
            if value.is_finite() {
                bucket.push(*value);
            }
        }

        let min_obs = min_num_obs.unwrap_or(1).max(1);
        let mut out = VarTimeSeries::default();
        for (period, mut values) in periods {
            let value = if values.len() >= min_obs {
                self.how.aggregate(&mut values).unwrap_or(f64::NAN)
            } else {
                f64::NAN
            };
            out.time.push(period);
            out.values.push(value);
        }
        Ok(out)
    }
}

/// Insert NaN points for expected period starts missing from the series
///
/// Expected timestamps run from the period containing `start` (or the first
/// point) to the period containing `stop` (or the last point). A period is
/// present when any point falls inside it, wherever in the period it lies.
pub fn insert_missing_nans(
    series: &VarTimeSeries,
    ts_type: TsType,
    start: Option<DateTime<Utc>>,
    stop: Option<DateTime<Utc>>,
) -> VarTimeSeries {
    let (Some(first), Some(last)) = (
        start.or_else(|| series.time.first().copied()),
        stop.or_else(|| series.time.last().copied()),
    ) else {
        return series.clone();
    };

    let mut expected = Vec::new();
    let mut period = ts_type.floor(first);
    let end = ts_type.floor(last);
    while period <= end {
        expected.push(period);
        period = ts_type.next(period);
    }

    let present: BTreeSet<DateTime<Utc>> =
        series.time.iter().map(|t| ts_type.floor(*t)).collect();
    let mut out = series.clone();
    for time in expected.into_iter().filter(|t| !present.contains(t)) {
        out.push_from(&VarTimeSeries::new(vec![time], vec![f64::NAN]), 0);
    }
    out.sort_by_time();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hourly_series() -> VarTimeSeries {
        let t = |d, h| Utc.with_ymd_and_hms(2020, 1, d, h, 0, 0).unwrap();
        VarTimeSeries::new(
            vec![t(1, 0), t(1, 6), t(1, 12), t(2, 0), t(3, 0)],
            vec![1.0, 2.0, 6.0, f64::NAN, 4.0],
        )
    }

    #[test]
    fn test_daily_mean() {
        let out = MeanResampler::default()
            .resample(&hourly_series(), TsType::Daily, None)
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.values[0], 3.0);
        assert!(out.values[1].is_nan());
        assert_eq!(out.values[2], 4.0);
    }

    #[test]
    fn test_median_and_min_num_obs() {
        let resampler = MeanResampler::new(ResampleHow::Median);
        let out = resampler
            .resample(&hourly_series(), TsType::Daily, Some(2))
            .unwrap();
        assert_eq!(out.values[0], 2.0);
        assert!(out.values[2].is_nan());
    }

    #[test]
    fn test_insert_missing_nans() {
        let t = |d| Utc.with_ymd_and_hms(2020, 1, d, 0, 0, 0).unwrap();
        let series = VarTimeSeries::new(vec![t(1), t(4)], vec![1.0, 4.0]);
        let filled = insert_missing_nans(&series, TsType::Daily, None, Some(t(5)));

        assert_eq!(filled.time, vec![t(1), t(2), t(3), t(4), t(5)]);
        assert_eq!(filled.valid_count(), 2);
        assert!(filled.values[1].is_nan());
    }

    #[test]
    fn test_insert_missing_nans_off_grid_points() {
        let noon = |d| Utc.with_ymd_and_hms(2020, 1, d, 12, 0, 0).unwrap();
        let series = VarTimeSeries::new(
            vec![noon(1), noon(2), noon(3)],
            vec![0.1, 0.2, 0.3],
        );

        let unchanged = insert_missing_nans(&series, TsType::Daily, None, None);
        assert_eq!(unchanged.time, series.time);
        assert_eq!(unchanged.valid_count(), 3);

        let series = VarTimeSeries::new(vec![noon(1), noon(3)], vec![0.1, 0.3]);
        let filled = insert_missing_nans(&series, TsType::Daily, None, None);
        assert_eq!(filled.len(), 3);
        assert_eq!(filled.time[1], Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap());
        assert!(filled.values[1].is_nan());
    }

    #[test]
    fn test_resample_how_from_str() {
        assert_eq!("MAX".parse::<ResampleHow>().unwrap(), ResampleHow::Max);
        assert!("sum".parse::<ResampleHow>().is_err());
    }
}
