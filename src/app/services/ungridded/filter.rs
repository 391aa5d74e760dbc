//! Metadata predicate filtering
//!
//! A [`MetaFilter`] is a list of (key, [`Predicate`]) conditions combined with
//! AND semantics. Negated keys invert their individual result before the AND.
//! Filtering never modifies the source container; the result holds only the
//! matching metadata blocks, renumbered from 0 with contiguous rows.

use super::{UngriddedData, VarRows};
use crate::app::models::{MetaValue, StationMeta};
use crate::config::OutlierConfig;
use crate::constants::{columns, meta_keys};
use crate::{Error, Result};
use ndarray::{Array1, Axis};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Condition on one metadata attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact string match, or wildcard match when the pattern has `*`, `?` or `[`
    Pattern(String),
    /// Membership in a list; string elements may be wildcards
    OneOf(Vec<MetaValue>),
    /// Closed numeric range `[low, high]`
    Range { low: f64, high: f64 },
    /// Exact value match
    Exact(MetaValue),
}

impl Predicate {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Predicate::Pattern(pattern.into())
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<MetaValue>,
    {
        Predicate::OneOf(values.into_iter().map(Into::into).collect())
    }

    pub fn range(low: f64, high: f64) -> Self {
        Predicate::Range { low, high }
    }

    pub fn exact(value: impl Into<MetaValue>) -> Self {
        Predicate::Exact(value.into())
    }

    /// Parse a predicate from its textual form
    ///
    /// - `[low,high]` with two numbers: range
    /// - `a,b,c`: list (numbers become numeric elements)
    /// - a number or `true`/`false`: exact value
    /// - anything else: string pattern
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
            if let [low, high] = parts.as_slice() {
                if let (Ok(low), Ok(high)) = (low.parse::<f64>(), high.parse::<f64>()) {
                    return Predicate::Range { low, high };
                }
            }
        }

        if text.contains(',') {
            return Predicate::OneOf(text.split(',').map(|p| parse_scalar(p.trim())).collect());
        }

        match parse_scalar(text) {
            MetaValue::Str(s) => Predicate::Pattern(s),
            value => Predicate::Exact(value),
        }
    }

    fn compile(&self, key: &str) -> Result<Matcher> {
        match self {
            Predicate::Pattern(p) => Ok(Matcher::Str(StrMatcher::new(key, p)?)),
            Predicate::OneOf(values) => {
                if values.is_empty() {
                    return Err(Error::invalid_filter(key, "empty list"));
                }
                let items = values
                    .iter()
                    .map(|v| match v {
                        MetaValue::Str(s) => StrMatcher::new(key, s).map(Item::Str),
                        other => Ok(Item::Value(other.clone())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Matcher::OneOf(items))
            }
            Predicate::Range { low, high } => {
                if low.is_nan() || high.is_nan() || low > high {
                    return Err(Error::invalid_filter(
                        key,
                        format!("malformed range [{}, {}]", low, high),
                    ));
                }
                Ok(Matcher::Range(*low, *high))
            }
            Predicate::Exact(value) => Ok(Matcher::Exact(value.clone())),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Pattern(p) => write!(f, "{}", p),
            Predicate::OneOf(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
            Predicate::Range { low, high } => write!(f, "[{},{}]", low, high),
            Predicate::Exact(value) => write!(f, "{}", value),
        }
    }
}

fn parse_scalar(text: &str) -> MetaValue {
    if let Ok(v) = text.parse::<i64>() {
        return MetaValue::Int(v);
    }
    if let Ok(v) = text.parse::<f64>() {
        return MetaValue::Float(v);
    }
    match text {
        "true" | "True" => MetaValue::Bool(true),
        "false" | "False" => MetaValue::Bool(false),
        _ => MetaValue::Str(text.to_string()),
    }
}

/// Whether a string contains glob wildcard characters
pub(crate) fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

pub(crate) fn compile_pattern(key: &str, pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern)
        .map_err(|e| Error::invalid_filter(key, format!("invalid pattern '{}': {}", pattern, e)))
}

enum StrMatcher {
    Exact(String),
    Glob(glob::Pattern),
}

impl StrMatcher {
    fn new(key: &str, pattern: &str) -> Result<Self> {
        if has_wildcard(pattern) {
            Ok(StrMatcher::Glob(compile_pattern(key, pattern)?))
        } else {
            Ok(StrMatcher::Exact(pattern.to_string()))
        }
    }

    fn matches_str(&self, value: &str) -> bool {
        match self {
            StrMatcher::Exact(s) => s == value,
            StrMatcher::Glob(p) => p.matches(value),
        }
    }

    fn matches(&self, value: &MetaValue) -> bool {
        match value {
            MetaValue::Str(s) => self.matches_str(s),
            MetaValue::List(items) => items.iter().any(|item| self.matches(item)),
            other => self.matches_str(&other.to_string()),
        }
    }
}

enum Item {
    Str(StrMatcher),
    Value(MetaValue),
}

enum Matcher {
    Str(StrMatcher),
    OneOf(Vec<Item>),
    Range(f64, f64),
    Exact(MetaValue),
}

fn values_equal(a: &MetaValue, b: &MetaValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

impl Matcher {
    fn matches(&self, value: Option<&MetaValue>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Matcher::Str(m) => m.matches(value),
            Matcher::OneOf(items) => items.iter().any(|item| match item {
                Item::Str(m) => m.matches(value),
                Item::Value(v) => Matcher::Exact(v.clone()).matches(Some(value)),
            }),
            Matcher::Range(low, high) => match value {
                MetaValue::List(items) => items
                    .iter()
                    .any(|item| Matcher::Range(*low, *high).matches(Some(item))),
                other => other
                    .as_f64()
                    .is_some_and(|v| v >= *low && v <= *high),
            },
            Matcher::Exact(expected) => match value {
                MetaValue::List(items) => items.iter().any(|item| values_equal(item, expected)),
                other => values_equal(other, expected),
            },
        }
    }
}

struct CompiledCondition {
    key: String,
    negate: bool,
    matcher: Matcher,
}

/// Compiled filter ready to be evaluated against metadata blocks
pub(crate) struct CompiledFilter {
    conditions: Vec<CompiledCondition>,
}

impl CompiledFilter {
    pub(crate) fn matches(&self, meta: &StationMeta) -> bool {
        self.conditions.iter().all(|c| {
            let matched = c.matcher.matches(meta.get(&c.key).as_ref());
            matched != c.negate
        })
    }
}

/// Conjunction of metadata predicates with optional per-key negation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaFilter {
    conditions: Vec<(String, Predicate)>,
    negate: BTreeSet<String>,
}

impl MetaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition on a metadata key
    pub fn with(mut self, key: impl Into<String>, predicate: Predicate) -> Self {
        self.conditions.push((key.into(), predicate));
        self
    }

    /// Invert the match result of a key
    pub fn negate(mut self, key: impl Into<String>) -> Self {
        self.negate.insert(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Predicate)] {
        &self.conditions
    }

    /// Parse `key=value` / `key!=value` arguments (see [`Predicate::parse`])
    pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut filter = MetaFilter::new();
        for arg in args {
            let arg = arg.as_ref();
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::invalid_filter(arg, "expected key=value or key!=value")
            })?;
            let (key, negated) = match key.strip_suffix('!') {
                Some(k) => (k.trim(), true),
                None => (key.trim(), false),
            };
            if key.is_empty() {
                return Err(Error::invalid_filter(arg, "empty key"));
            }
            filter = filter.with(key, Predicate::parse(value));
            if negated {
                filter = filter.negate(key);
            }
        }
        Ok(filter)
    }

    /// Human-readable description used in the filter history
    pub fn describe(&self) -> String {
        self.conditions
            .iter()
            .map(|(key, predicate)| {
                let op = if self.negate.contains(key) { "!=" } else { "=" };
                format!("{}{}{}", key, op, predicate)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Combined filter pipeline applied by [`UngriddedData::apply_filters`]
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    /// Metadata predicates, applied last
    pub meta: MetaFilter,
    /// Set flagged points to NaN first
    pub set_flags_nan: bool,
    /// Remove outliers of every variable with a known valid range
    pub remove_outliers: bool,
    /// Range overrides taking precedence over the configured ranges
    pub outlier_ranges: BTreeMap<String, (f64, f64)>,
    /// Rectangular region name
    pub region: Option<String>,
    /// Station altitude range
    pub altitude_range: Option<(f64, f64)>,
}

impl UngriddedData {
    /// Compile a filter, failing on keys unknown to every metadata block
    pub(crate) fn compile_filter(&self, filter: &MetaFilter) -> Result<CompiledFilter> {
        let mut conditions = Vec::with_capacity(filter.conditions.len());
        for (key, predicate) in &filter.conditions {
            let known = meta_keys::ALL.contains(&key.as_str())
                || self.metadata.values().any(|m| m.has_key(key));
            if !known {
                return Err(Error::invalid_filter_key(key));
            }
            conditions.push(CompiledCondition {
                key: key.clone(),
                negate: filter.negate.contains(key),
                matcher: predicate.compile(key)?,
            });
        }

        for key in &filter.negate {
            if !filter.conditions.iter().any(|(k, _)| k == key) {
                return Err(Error::invalid_filter(key, "negated key has no condition"));
            }
        }

        Ok(CompiledFilter { conditions })
    }

    /// Metadata block indices matching a filter
    pub fn find_meta_matches(&self, filter: &MetaFilter) -> Result<Vec<usize>> {
        let compiled = self.compile_filter(filter)?;
        Ok(self
            .metadata
            .iter()
            .filter(|(_, meta)| compiled.matches(meta))
            .map(|(idx, _)| *idx)
            .collect())
    }

    /// New container with only the metadata blocks matching all predicates
    pub fn filter_by_meta(&self, filter: &MetaFilter) -> Result<Self> {
        let indices = self.find_meta_matches(filter)?;
        let mut new = self.rebuild(&indices, None, false)?;
        new.add_history(format!("filter_by_meta: {}", filter.describe()));

        info!(
            "Metadata filter [{}]: {} of {} metadata blocks kept ({} rows)",
            filter.describe(),
            new.metadata.len(),
            self.metadata.len(),
            new.data.nrows()
        );
        Ok(new)
    }

    /// New container with stations inside an altitude range
    pub fn filter_altitude(&self, low: f64, high: f64) -> Result<Self> {
        self.filter_by_meta(&MetaFilter::new().with(meta_keys::ALTITUDE, Predicate::range(low, high)))
    }

    /// New container with the blocks of one dataset
    pub fn extract_dataset(&self, data_id: &str) -> Result<Self> {
        self.filter_by_meta(
            &MetaFilter::new().with(meta_keys::DATA_ID, Predicate::exact(data_id)),
        )
    }

    /// New container without metadata blocks that hold no rows
    pub fn clear_meta_no_data(&self) -> Result<Self> {
        let indices: Vec<usize> = self
            .meta_idx
            .iter()
            .filter(|(_, vars)| vars.values().any(|rows| !rows.is_empty()))
            .map(|(idx, _)| *idx)
            .collect();

        let removed = self.metadata.len() - indices.len();
        if removed > 0 {
            info!("Removing {} metadata blocks without data", removed);
        } else {
            debug!("All metadata blocks hold data");
        }

        let mut new = self.rebuild(&indices, None, false)?;
        new.add_history(format!("clear_meta_no_data: removed {} blocks", removed));
        Ok(new)
    }

    /// Remove metadata blocks that hold no rows (in place)
    ///
    /// Returns the number of removed blocks.
    pub fn clear_meta_no_data_in_place(&mut self) -> Result<usize> {
        let before = self.metadata.len();
        *self = self.clear_meta_no_data()?;
        Ok(before - self.metadata.len())
    }

    /// Apply flag masking, outlier removal, region, altitude and metadata filters
    pub fn apply_filters(&self, spec: &FilterSpec, outliers: &OutlierConfig) -> Result<Self> {
        let mut data = self.clone();

        if spec.set_flags_nan {
            data.set_flags_nan_in_place()?;
        }

        if spec.remove_outliers {
            for var_name in data.contains_vars() {
                let range = spec
                    .outlier_ranges
                    .get(&var_name)
                    .copied()
                    .or_else(|| outliers.range(&var_name));
                match range {
                    Some((low, high)) => {
                        data.remove_outliers_in_place(&var_name, low, high, false)?;
                    }
                    None => debug!("No valid range known for {}, outliers kept", var_name),
                }
            }
        }

        if let Some(region) = &spec.region {
            data = data.filter_region(region)?;
        }

        if let Some((low, high)) = spec.altitude_range {
            data = data.filter_altitude(low, high)?;
        }

        if !spec.meta.is_empty() {
            data = data.filter_by_meta(&spec.meta)?;
        }

        Ok(data)
    }

    /// Build a new container from a subset of metadata blocks
    ///
    /// Blocks are renumbered from 0 in the given order and their rows are
    /// copied contiguously. With `var_map`, only the listed variables are
    /// kept, renumbered to the given indices, and `var_info` is restricted
    /// to them. With `drop_empty`, blocks left without rows are dropped.
    pub(crate) fn rebuild(
        &self,
        indices: &[usize],
        var_map: Option<&BTreeMap<String, usize>>,
        drop_empty: bool,
    ) -> Result<Self> {
        let mut new = self.empty_like();
        let mut order: Vec<usize> = Vec::new();
        let mut meta_column: Vec<f64> = Vec::new();
        let mut var_column: Vec<f64> = Vec::new();
        let mut new_key = 0usize;

        for old_key in indices {
            let meta = self.metadata.get(old_key).ok_or_else(|| {
                Error::consistency(format!("metadata block {} does not exist", old_key))
            })?;
            let block_start = order.len();
            let mut var_rows = VarRows::new();

            if let Some(vars) = self.meta_idx.get(old_key) {
                for (var_name, rows) in vars {
                    if rows.is_empty() {
                        continue;
                    }
                    let var_num = match var_map {
                        Some(map) => match map.get(var_name) {
                            Some(num) => *num,
                            None => continue,
                        },
                        None => *self.var_idx.get(var_name).ok_or_else(|| {
                            Error::consistency(format!("variable {} has no index", var_name))
                        })?,
                    };

                    let start = order.len();
                    order.extend_from_slice(rows);
                    var_column.extend(std::iter::repeat_n(var_num as f64, rows.len()));
                    var_rows.insert(var_name.clone(), (start..order.len()).collect());
                    new.var_idx.insert(var_name.clone(), var_num);
                }
            }

            if drop_empty && order.len() == block_start {
                continue;
            }

            meta_column.extend(std::iter::repeat_n(new_key as f64, order.len() - block_start));

            let mut meta = meta.clone();
            if let Some(map) = var_map {
                meta.var_info.retain(|var_name, _| map.contains_key(var_name));
            }
            new.metadata.insert(new_key, meta);
            new.meta_idx.insert(new_key, var_rows);
            new_key += 1;
        }

        new.data = self.data.select(Axis(0), &order);
        new.data
            .column_mut(columns::META_IDX)
            .assign(&Array1::from_vec(meta_column));
        new.data
            .column_mut(columns::VAR_IDX)
            .assign(&Array1::from_vec(var_column));

        let datasets: BTreeSet<String> = new.contains_datasets().into_iter().collect();
        new.data_revision.retain(|data_id, _| datasets.contains(data_id));

        new.check_index()?;
        Ok(new)
    }
}
