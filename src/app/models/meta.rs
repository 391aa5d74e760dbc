//! Metadata block and attribute value types

use super::TsType;
use crate::constants::meta_keys;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar (or list of scalars) metadata attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    List(Vec<MetaValue>),
}

impl MetaValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Float(v) => Some(*v),
            MetaValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Equality where floats are compared with a relative tolerance
    pub fn approx_eq(&self, other: &MetaValue, rtol: f64) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => {
                if a.is_nan() || b.is_nan() {
                    return a.is_nan() && b.is_nan();
                }
                (a - b).abs() <= rtol * a.abs().max(b.abs())
            }
            _ => match (self, other) {
                (MetaValue::List(a), MetaValue::List(b)) => {
                    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.approx_eq(y, rtol))
                }
                _ => self == other,
            },
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Str(s) => write!(f, "{}", s),
            MetaValue::Float(v) => write!(f, "{}", v),
            MetaValue::Int(v) => write!(f, "{}", v),
            MetaValue::Bool(v) => write!(f, "{}", v),
            MetaValue::List(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

/// Variable metadata attached to a metadata block
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VarInfo {
    /// Units of the variable (e.g. "1", "ug m-3")
    pub units: Option<String>,

    /// Sampling frequency of the variable
    pub ts_type: Option<TsType>,

    /// Additional variable attributes
    pub extra: BTreeMap<String, MetaValue>,
}

impl VarInfo {
    pub fn with_units(units: impl Into<String>) -> Self {
        Self {
            units: Some(units.into()),
            ..Default::default()
        }
    }
}

/// Station-level metadata of one metadata block
///
/// One block exists per distinct station + instrument + source combination.
/// Unknown coordinates are stored as NaN.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StationMeta {
    pub data_id: String,
    pub station_name: String,
    pub station_id: Option<String>,
    pub instrument_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub country: Option<String>,
    pub ts_type: Option<TsType>,
    pub data_revision: Option<String>,

    /// Variable name -> variable metadata
    pub var_info: BTreeMap<String, VarInfo>,

    /// Open-ended passthrough attributes
    pub extra: BTreeMap<String, MetaValue>,
}

impl StationMeta {
    /// Look up an attribute by key
    ///
    /// Fixed fields are addressed by their field name, anything else is
    /// looked up in `extra`. NaN coordinates and unset optional fields
    /// return `None`. The virtual key `variables` lists the variables in
    /// `var_info`.
    pub fn get(&self, key: &str) -> Option<MetaValue> {
        let finite = |v: f64| (!v.is_nan()).then_some(MetaValue::Float(v));
        match key {
            meta_keys::DATA_ID => Some(MetaValue::Str(self.data_id.clone())),
            meta_keys::STATION_NAME => Some(MetaValue::Str(self.station_name.clone())),
            meta_keys::STATION_ID => self.station_id.clone().map(MetaValue::Str),
            meta_keys::INSTRUMENT_NAME => self.instrument_name.clone().map(MetaValue::Str),
            meta_keys::LATITUDE => finite(self.latitude),
            meta_keys::LONGITUDE => finite(self.longitude),
            meta_keys::ALTITUDE => finite(self.altitude),
            meta_keys::COUNTRY => self.country.clone().map(MetaValue::Str),
            meta_keys::TS_TYPE => self.ts_type.map(|t| MetaValue::Str(t.to_string())),
            meta_keys::DATA_REVISION => self.data_revision.clone().map(MetaValue::Str),
            meta_keys::VARIABLES => Some(MetaValue::List(
                self.var_info
                    .keys()
                    .map(|v| MetaValue::Str(v.clone()))
                    .collect(),
            )),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Whether the key is addressable on this block (fixed field or extra)
    pub fn has_key(&self, key: &str) -> bool {
        meta_keys::ALL.contains(&key) || self.extra.contains_key(key)
    }

    /// All attribute keys of the block except `var_info` / `variables`
    pub fn attribute_keys(&self) -> Vec<String> {
        meta_keys::ALL
            .iter()
            .filter(|k| **k != meta_keys::VARIABLES)
            .map(|k| k.to_string())
            .chain(self.extra.keys().cloned())
            .collect()
    }

    /// Station coordinates as (latitude, longitude, altitude)
    pub fn coordinates(&self) -> (f64, f64, f64) {
        (self.latitude, self.longitude, self.altitude)
    }

    /// Whether latitude and longitude are both known
    pub fn has_location(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Compare two blocks attribute by attribute
    ///
    /// `var_info` is never compared. Keys in `ignore_keys` are skipped and
    /// numeric attributes are compared with relative tolerance `rtol`.
    pub fn same_as(&self, other: &StationMeta, ignore_keys: &[String], rtol: f64) -> bool {
        let mut keys = self.attribute_keys();
        for key in other.extra.keys() {
            if !self.extra.contains_key(key) {
                keys.push(key.clone());
            }
        }

        keys.iter()
            .filter(|key| !ignore_keys.contains(key))
            .all(|key| match (self.get(key), other.get(key)) {
                (None, None) => true,
                (Some(a), Some(b)) => a.approx_eq(&b, rtol),
                _ => false,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, lat: f64) -> StationMeta {
        StationMeta {
            data_id: "net".to_string(),
            station_name: name.to_string(),
            latitude: lat,
            longitude: 20.0,
            altitude: f64::NAN,
            ..Default::default()
        }
    }

    #[test]
    fn test_get_fixed_and_extra_keys() {
        let mut m = meta("A", 10.0);
        m.extra.insert("PI".to_string(), MetaValue::from("Doe"));

        assert_eq!(m.get("station_name"), Some(MetaValue::from("A")));
        assert_eq!(m.get("latitude"), Some(MetaValue::Float(10.0)));
        assert_eq!(m.get("altitude"), None);
        assert_eq!(m.get("PI"), Some(MetaValue::from("Doe")));
        assert_eq!(m.get("nonexistent"), None);
    }

    #[test]
    fn test_has_key() {
        let m = meta("A", 10.0);
        assert!(m.has_key("country"));
        assert!(!m.has_key("PI"));
    }

    #[test]
    fn test_same_as_with_tolerance_and_ignore_keys() {
        let mut a = meta("A", 10.0);
        let mut b = meta("A", 10.05);
        assert!(a.same_as(&b, &[], 1e-2));

        a.data_revision = Some("20200101".to_string());
        b.data_revision = Some("20210101".to_string());
        assert!(!a.same_as(&b, &[], 1e-2));
        assert!(a.same_as(&b, &["data_revision".to_string()], 1e-2));
    }

    #[test]
    fn test_same_as_detects_extra_only_on_other() {
        let a = meta("A", 10.0);
        let mut b = meta("A", 10.0);
        b.extra.insert("PI".to_string(), MetaValue::from("Doe"));
        assert!(!a.same_as(&b, &[], 1e-2));
    }

    #[test]
    fn test_approx_eq_nan() {
        assert!(MetaValue::Float(f64::NAN).approx_eq(&MetaValue::Float(f64::NAN), 1e-2));
        assert!(!MetaValue::Float(1.0).approx_eq(&MetaValue::Float(f64::NAN), 1e-2));
    }
}
