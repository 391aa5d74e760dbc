//! Reconstruction of station time series from the flat array
//!
//! A query selects metadata blocks (by index or station name), reads the rows
//! of the requested variables through the row index table, applies the time
//! window and hands the result to optional resampling. When a station name
//! matches several blocks their series are merged according to a
//! [`MergePolicy`].

use super::{UngriddedData, from_epoch};
use crate::app::models::{StationData, StationMeta, TsType, VarTimeSeries};
use crate::app::services::resample::{MeanResampler, ResampleHow, Resampler, insert_missing_nans};
use crate::config::QueryConfig;
use crate::constants::{FLAG_INVALID, columns};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Station selection by metadata block index or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationSelector {
    Index(usize),
    Name(String),
}

impl From<usize> for StationSelector {
    fn from(index: usize) -> Self {
        StationSelector::Index(index)
    }
}

impl From<&str> for StationSelector {
    fn from(name: &str) -> Self {
        StationSelector::Name(name.to_string())
    }
}

impl From<String> for StationSelector {
    fn from(name: String) -> Self {
        StationSelector::Name(name)
    }
}

impl fmt::Display for StationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationSelector::Index(i) => write!(f, "block {}", i),
            StationSelector::Name(name) => write!(f, "{}", name),
        }
    }
}

/// One criterion of a merge ranking
///
/// Criteria are evaluated in order; the first one that distinguishes two
/// blocks decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "criterion", rename_all = "snake_case")]
pub enum RankCriterion {
    /// Prefer blocks whose attribute equals an earlier entry of `values`
    PreferValue { key: String, values: Vec<String> },
    /// Order by an attribute value; blocks without the attribute rank last
    Attribute { key: String, descending: bool },
    /// Prefer blocks with more valid points
    PointCount,
}

/// Candidate block seen by the ranking
struct Candidate<'a> {
    meta_key: usize,
    meta: &'a StationMeta,
    num_valid: usize,
}

impl RankCriterion {
    /// `Less` means `a` ranks higher than `b`
    fn compare(&self, a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
        match self {
            RankCriterion::PreferValue { key, values } => {
                let position = |c: &Candidate<'_>| {
                    c.meta
                        .get(key)
                        .and_then(|v| values.iter().position(|p| *p == v.to_string()))
                        .unwrap_or(usize::MAX)
                };
                position(a).cmp(&position(b))
            }
            RankCriterion::Attribute { key, descending } => {
                match (a.meta.get(key), b.meta.get(key)) {
                    (Some(x), Some(y)) => {
                        let ord = match (x.as_f64(), y.as_f64()) {
                            (Some(fx), Some(fy)) => fx.total_cmp(&fy),
                            _ => x.to_string().cmp(&y.to_string()),
                        };
                        if *descending { ord.reverse() } else { ord }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
            RankCriterion::PointCount => b.num_valid.cmp(&a.num_valid),
        }
    }
}

/// Ranking used to merge several blocks matching one station
///
/// Ties left by all criteria are broken by ascending block index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    pub ranking: Vec<RankCriterion>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            ranking: vec![RankCriterion::PointCount],
        }
    }
}

impl MergePolicy {
    pub fn new(ranking: Vec<RankCriterion>) -> Self {
        Self { ranking }
    }

    /// Prefer blocks whose `key` matches one of `values`, then point count
    pub fn prefer(key: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(vec![
            RankCriterion::PreferValue {
                key: key.into(),
                values,
            },
            RankCriterion::PointCount,
        ])
    }

    fn order(&self, candidates: &mut [Candidate<'_>]) {
        candidates.sort_by(|a, b| {
            self.ranking
                .iter()
                .map(|c| c.compare(a, b))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.meta_key.cmp(&b.meta_key))
        });
    }
}

/// Options of a station query
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Inclusive start of the time window
    pub start: Option<DateTime<Utc>>,

    /// Inclusive end of the time window
    pub stop: Option<DateTime<Utc>>,

    /// Output frequency (resampling when coarser than the stored frequency)
    pub freq: Option<TsType>,

    pub resample_how: ResampleHow,

    /// Minimum number of valid points per output period
    pub min_num_obs: Option<usize>,

    /// Insert NaN for missing expected timestamps
    pub insert_nans: bool,

    /// Merge blocks sharing a station name
    pub merge_if_multi: bool,

    pub merge_policy: MergePolicy,

    /// Treat `*`, `?` and `[..]` in station names as wildcards
    pub allow_wildcards: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

impl QueryOptions {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            start: None,
            stop: None,
            freq: None,
            resample_how: ResampleHow::default(),
            min_num_obs: config.min_num_obs,
            insert_nans: false,
            merge_if_multi: config.merge_if_multi,
            merge_policy: config.merge_policy.clone(),
            allow_wildcards: config.allow_wildcards_station_name,
        }
    }

    pub fn with_time_window(
        mut self,
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
    ) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn with_freq(mut self, freq: TsType) -> Self {
        self.freq = Some(freq);
        self
    }

    pub fn with_resample_how(mut self, how: ResampleHow) -> Self {
        self.resample_how = how;
        self
    }

    pub fn with_insert_nans(mut self, insert_nans: bool) -> Self {
        self.insert_nans = insert_nans;
        self
    }

    pub fn with_merge_if_multi(mut self, merge_if_multi: bool) -> Self {
        self.merge_if_multi = merge_if_multi;
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    fn in_window(&self, time: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| time >= start) && self.stop.is_none_or(|stop| time <= stop)
    }
}

/// Station that could not be retrieved during a bulk query
#[derive(Debug, Clone)]
pub struct FailedFetch {
    pub selector: StationSelector,
    pub reason: String,
}

/// Result of a bulk station query
#[derive(Debug, Clone, Default)]
pub struct StationDataCollection {
    pub stations: Vec<StationData>,
    pub failed: Vec<FailedFetch>,
}

impl StationDataCollection {
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

impl UngriddedData {
    /// Reconstruct the time series of one station
    ///
    /// `vars` empty selects every variable of the container. Unknown
    /// variables fail with [`Error::VariableNotAvailable`]; a selection
    /// leaving no data fails with [`Error::DataCoverage`].
    pub fn to_station_data(
        &self,
        selector: impl Into<StationSelector>,
        vars: &[&str],
        opts: &QueryOptions,
    ) -> Result<StationData> {
        let resampler = MeanResampler::new(opts.resample_how);
        self.to_station_data_with_resampler(selector, vars, opts, &resampler)
    }

    /// Same as [`to_station_data`](Self::to_station_data) with a custom resampler
    pub fn to_station_data_with_resampler(
        &self,
        selector: impl Into<StationSelector>,
        vars: &[&str],
        opts: &QueryOptions,
        resampler: &dyn Resampler,
    ) -> Result<StationData> {
        let vars = self.resolve_vars(vars)?;
        let station = match selector.into() {
            StationSelector::Index(meta_key) => self.block_station_data(meta_key, &vars, opts)?,
            StationSelector::Name(name) => {
                let indices = self.find_station_meta_indices(&name, opts.allow_wildcards)?;
                if indices.len() == 1 {
                    self.block_station_data(indices[0], &vars, opts)?
                } else if !opts.merge_if_multi {
                    return Err(Error::AmbiguousStation {
                        station: name,
                        count: indices.len(),
                    });
                } else {
                    let parts = self.collect_blocks(&name, &indices, &vars, opts)?;
                    self.merge_ranked(parts, &opts.merge_policy)?
                }
            }
        };
        post_process(station, opts, resampler)
    }

    /// Station time series by exact (or wildcard) station name
    pub fn to_station_data_by_name(
        &self,
        station_name: &str,
        vars: &[&str],
        opts: &QueryOptions,
    ) -> Result<StationData> {
        self.to_station_data(station_name, vars, opts)
    }

    /// One unmerged result per metadata block matching a station name
    ///
    /// Blocks without data for the requested variables are skipped.
    pub fn to_station_data_multi(
        &self,
        station_name: &str,
        vars: &[&str],
        opts: &QueryOptions,
    ) -> Result<Vec<StationData>> {
        let vars = self.resolve_vars(vars)?;
        let indices = self.find_station_meta_indices(station_name, opts.allow_wildcards)?;
        let resampler = MeanResampler::new(opts.resample_how);

        self.collect_blocks(station_name, &indices, &vars, opts)?
            .into_iter()
            .map(|station| post_process(station, opts, &resampler))
            .collect()
    }

    /// Time series of every station
    ///
    /// Stations that cannot be retrieved are recorded in
    /// [`StationDataCollection::failed`]; the call only fails if no station
    /// at all could be retrieved or a non-recoverable error occurs.
    pub fn to_station_data_all(
        &self,
        vars: &[&str],
        opts: &QueryOptions,
        by_station_name: bool,
    ) -> Result<StationDataCollection> {
        let selectors: Vec<StationSelector> = if by_station_name {
            self.unique_station_names()
                .into_iter()
                .map(StationSelector::Name)
                .collect()
        } else {
            self.metadata.keys().map(|k| StationSelector::Index(*k)).collect()
        };

        let mut opts = opts.clone();
        opts.allow_wildcards = false;

        let total = selectors.len();
        let mut collection = StationDataCollection::default();
        for selector in selectors {
            match self.to_station_data(selector.clone(), vars, &opts) {
                Ok(station) => collection.stations.push(station),
                Err(e) if e.is_recoverable() => {
                    debug!("Skipping station {}: {}", selector, e);
                    collection.failed.push(FailedFetch {
                        selector,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if !collection.failed.is_empty() {
            warn!(
                "{} of {} stations could not be retrieved",
                collection.failed.len(),
                total
            );
        }

        if collection.stations.is_empty() {
            return Err(Error::data_coverage(format!(
                "none of the {} stations has data for {:?}",
                total, vars
            )));
        }

        info!(
            "Retrieved {} of {} stations",
            collection.stations.len(),
            total
        );
        Ok(collection)
    }

    /// Time series of one variable at one station
    pub fn get_timeseries(
        &self,
        station_name: &str,
        var_name: &str,
        opts: &QueryOptions,
    ) -> Result<VarTimeSeries> {
        let mut station = self.to_station_data(station_name, &[var_name], opts)?;
        station
            .series
            .remove(var_name)
            .ok_or_else(|| Error::data_coverage(format!("no {} data at {}", var_name, station_name)))
    }

    fn resolve_vars(&self, vars: &[&str]) -> Result<Vec<String>> {
        if vars.is_empty() {
            return Ok(self.contains_vars());
        }
        vars.iter()
            .map(|var| {
                if self.var_idx.contains_key(*var) {
                    Ok(var.to_string())
                } else {
                    Err(Error::variable_not_available(*var))
                }
            })
            .collect()
    }

    /// Per-block results of several blocks, skipping blocks without coverage
    fn collect_blocks(
        &self,
        station_name: &str,
        indices: &[usize],
        vars: &[String],
        opts: &QueryOptions,
    ) -> Result<Vec<StationData>> {
        let mut parts = Vec::with_capacity(indices.len());
        for &meta_key in indices {
            match self.block_station_data(meta_key, vars, opts) {
                Ok(part) => parts.push(part),
                Err(e @ Error::DataCoverage { .. }) => {
                    debug!("Block {} of {} skipped: {}", meta_key, station_name, e)
                }
                Err(e) => return Err(e),
            }
        }
        if parts.is_empty() {
            return Err(Error::data_coverage(format!(
                "none of the {} blocks of {} has data for {:?}",
                indices.len(),
                station_name,
                vars
            )));
        }
        Ok(parts)
    }

    /// Read the series of one metadata block
    fn block_station_data(
        &self,
        meta_key: usize,
        vars: &[String],
        opts: &QueryOptions,
    ) -> Result<StationData> {
        let meta = self
            .metadata
            .get(&meta_key)
            .ok_or_else(|| Error::station_not_found(format!("metadata block {}", meta_key)))?;
        let var_rows = self.meta_idx.get(&meta_key).ok_or_else(|| {
            Error::consistency(format!("metadata block {} has no row index", meta_key))
        })?;

        let mut series = BTreeMap::new();
        for var_name in vars {
            let Some(rows) = var_rows.get(var_name) else {
                continue;
            };

            let has_errors = rows.iter().any(|&r| self.data[[r, columns::ERROR]].is_finite());
            let has_flags = rows.iter().any(|&r| self.data[[r, columns::FLAG]].is_finite());

            let mut ts = VarTimeSeries::default();
            let mut errors = Vec::new();
            let mut flags = Vec::new();
            for &row in rows {
                let Some(time) = from_epoch(self.data[[row, columns::TIME]]) else {
                    continue;
                };
                if !opts.in_window(time) {
                    continue;
                }
                ts.time.push(time);
                ts.values.push(self.data[[row, columns::VALUE]]);
                errors.push(self.data[[row, columns::ERROR]]);
                flags.push(self.data[[row, columns::FLAG]] == FLAG_INVALID);
            }
            if has_errors {
                ts.errors = Some(errors);
            }
            if has_flags {
                ts.flags = Some(flags);
            }

            ts.sort_by_time();
            if ts.all_nan() {
                debug!(
                    "No valid {} data in block {} ({})",
                    var_name, meta_key, meta.station_name
                );
                continue;
            }
            series.insert(var_name.clone(), ts);
        }

        if series.is_empty() {
            return Err(Error::data_coverage(format!(
                "no data for {:?} at {} (block {})",
                vars, meta.station_name, meta_key
            )));
        }

        let mut meta = meta.clone();
        meta.var_info.retain(|var_name, _| series.contains_key(var_name));

        Ok(StationData {
            meta,
            meta_indices: vec![meta_key],
            series,
            overlap: BTreeMap::new(),
        })
    }

    /// Merge per-block results, highest ranked first
    fn merge_ranked(&self, parts: Vec<StationData>, policy: &MergePolicy) -> Result<StationData> {
        let order: Vec<usize> = {
            let mut candidates: Vec<Candidate<'_>> = parts
                .iter()
                .enumerate()
                .map(|(pos, part)| Candidate {
                    meta_key: part.meta_indices.first().copied().unwrap_or(pos),
                    meta: &part.meta,
                    num_valid: part.num_valid(),
                })
                .collect();
            policy.order(&mut candidates);
            candidates.iter().map(|c| c.meta_key).collect()
        };

        let mut by_key: BTreeMap<usize, StationData> = parts
            .into_iter()
            .map(|part| (part.meta_indices[0], part))
            .collect();

        let mut ranked = order.into_iter().filter_map(|key| by_key.remove(&key));
        let mut merged = ranked
            .next()
            .ok_or_else(|| Error::data_coverage("nothing to merge"))?;

        for part in ranked {
            merged.meta_indices.extend(&part.meta_indices);
            for (var_name, ts) in part.series {
                if let Some(info) = part.meta.var_info.get(&var_name) {
                    merged
                        .meta
                        .var_info
                        .entry(var_name.clone())
                        .or_insert_with(|| info.clone());
                }

                let existing = match merged.series.entry(var_name.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(ts);
                        continue;
                    }
                    Entry::Occupied(slot) => slot.into_mut(),
                };

                let present: BTreeSet<DateTime<Utc>> = existing.time.iter().copied().collect();
                let overlap = merged.overlap.entry(var_name.clone()).or_default();
                for i in 0..ts.len() {
                    if present.contains(&ts.time[i]) {
                        overlap.push_from(&ts, i);
                    } else {
                        existing.push_from(&ts, i);
                    }
                }
                existing.sort_by_time();
            }
        }

        merged.overlap.retain(|_, ts| !ts.is_empty());
        for (var_name, ts) in &merged.overlap {
            debug!(
                "{} overlapping {} points displaced at {}",
                ts.len(),
                var_name,
                merged.meta.station_name
            );
        }

        Ok(merged)
    }
}

/// Resampling and NaN insertion on a retrieved station
fn post_process(
    mut station: StationData,
    opts: &QueryOptions,
    resampler: &dyn Resampler,
) -> Result<StationData> {
    if opts.freq.is_none() && !opts.insert_nans {
        return Ok(station);
    }

    let StationData { meta, series, .. } = &mut station;
    for (var_name, ts) in series.iter_mut() {
        let source = meta
            .var_info
            .get(var_name)
            .and_then(|info| info.ts_type)
            .or(meta.ts_type);

        let target = match (opts.freq, source) {
            (Some(freq), Some(source)) if freq < source => {
                warn!(
                    "Cannot resample {} at {} from {} to finer {}",
                    var_name, meta.station_name, source, freq
                );
                Some(source)
            }
            (Some(freq), source) => {
                if source != Some(freq) {
                    *ts = resampler.resample(ts, freq, opts.min_num_obs)?;
                }
                Some(freq)
            }
            (None, source) => source,
        };

        if let Some(target) = target {
            if opts.insert_nans {
                *ts = insert_missing_nans(ts, target, opts.start, opts.stop);
            }
            if let Some(info) = meta.var_info.get_mut(var_name) {
                info.ts_type = Some(target);
            }
        }
    }

    Ok(station)
}
