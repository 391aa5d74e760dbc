//! Spatial filtering: rectangular regions, raster masks and countries

use super::UngriddedData;
use crate::app::models::StationMeta;
use crate::app::services::ungridded::filter::{MetaFilter, Predicate};
use crate::constants::{DEFAULT_REGIONS, EARTH_RADIUS_KM, meta_keys};
use crate::{Error, Result};
use ndarray::Array2;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Anything that can decide whether a coordinate lies inside a region
pub trait RegionMask {
    fn name(&self) -> &str;

    /// Whether (lat, lon) lies inside; unknown coordinates never do
    fn contains(&self, lat: f64, lon: f64) -> bool;
}

/// Rectangular latitude/longitude region
///
/// A longitude range with `low > high` crosses the dateline.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub lat_range: (f64, f64),
    pub lon_range: (f64, f64),
}

impl Region {
    pub fn new(name: impl Into<String>, lat_range: (f64, f64), lon_range: (f64, f64)) -> Result<Self> {
        let name = name.into();
        let (lat_lo, lat_hi) = lat_range;
        if !(lat_lo <= lat_hi && lat_lo >= -90.0 && lat_hi <= 90.0) {
            return Err(Error::invalid_filter(
                "region",
                format!("{}: invalid latitude range [{}, {}]", name, lat_lo, lat_hi),
            ));
        }
        let (lon_lo, lon_hi) = lon_range;
        let valid_lon = |v: f64| (-180.0..=180.0).contains(&v);
        if !(valid_lon(lon_lo) && valid_lon(lon_hi)) {
            return Err(Error::invalid_filter(
                "region",
                format!("{}: invalid longitude range [{}, {}]", name, lon_lo, lon_hi),
            ));
        }
        Ok(Self {
            name,
            lat_range,
            lon_range,
        })
    }

    /// Look up one of the default regions (case-insensitive)
    pub fn from_name(name: &str) -> Result<Self> {
        DEFAULT_REGIONS
            .iter()
            .find(|(region, ..)| region.eq_ignore_ascii_case(name))
            .map(|(region, lat_lo, lat_hi, lon_lo, lon_hi)| Self {
                name: region.to_string(),
                lat_range: (*lat_lo, *lat_hi),
                lon_range: (*lon_lo, *lon_hi),
            })
            .ok_or_else(|| Error::invalid_filter("region", format!("unknown region '{}'", name)))
    }

    /// Names of the default regions
    pub fn available() -> Vec<&'static str> {
        DEFAULT_REGIONS.iter().map(|(name, ..)| *name).collect()
    }

    pub fn crosses_dateline(&self) -> bool {
        self.lon_range.0 > self.lon_range.1
    }
}

impl RegionMask for Region {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat.is_nan() || lon.is_nan() {
            return false;
        }
        let (lat_lo, lat_hi) = self.lat_range;
        let (lon_lo, lon_hi) = self.lon_range;
        let in_lat = lat >= lat_lo && lat <= lat_hi;
        let in_lon = if self.crosses_dateline() {
            lon >= lon_lo || lon <= lon_hi
        } else {
            lon >= lon_lo && lon <= lon_hi
        };
        in_lat && in_lon
    }
}

/// Gridded binary mask; a coordinate takes the value of the nearest cell
#[derive(Debug, Clone)]
pub struct RasterMask {
    name: String,
    lats: Vec<f64>,
    lons: Vec<f64>,
    /// (lat, lon) grid; values > 0 are inside
    values: Array2<f64>,
}

impl RasterMask {
    pub fn new(
        name: impl Into<String>,
        lats: Vec<f64>,
        lons: Vec<f64>,
        values: Array2<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if lats.is_empty() || lons.is_empty() || values.dim() != (lats.len(), lons.len()) {
            return Err(Error::invalid_filter(
                "mask",
                format!(
                    "{}: grid of shape {:?} does not match {} latitudes x {} longitudes",
                    name,
                    values.dim(),
                    lats.len(),
                    lons.len()
                ),
            ));
        }
        Ok(Self {
            name,
            lats,
            lons,
            values,
        })
    }
}

fn nearest(axis: &[f64], value: f64) -> usize {
    axis.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - value).abs().total_cmp(&(*b - value).abs()))
        .map_or(0, |(i, _)| i)
}

impl RegionMask for RasterMask {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat.is_nan() || lon.is_nan() {
            return false;
        }
        self.values[[nearest(&self.lats, lat), nearest(&self.lons, lon)]] > 0.0
    }
}

/// Country lookup from coordinates
pub trait ReverseGeocoder {
    fn country(&self, lat: f64, lon: f64) -> Option<String>;
}

impl<F> ReverseGeocoder for F
where
    F: Fn(f64, f64) -> Option<String>,
{
    fn country(&self, lat: f64, lon: f64) -> Option<String> {
        self(lat, lon)
    }
}

/// Great-circle distance in km
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

impl UngriddedData {
    /// New container with the stations inside a default region
    pub fn filter_region(&self, region_name: &str) -> Result<Self> {
        self.apply_region_mask(&Region::from_name(region_name)?)
    }

    /// New container with the stations inside a custom region
    pub fn filter_region_by(&self, region: &Region) -> Result<Self> {
        self.apply_region_mask(region)
    }

    /// New container with the stations inside a mask
    pub fn apply_region_mask(&self, mask: &dyn RegionMask) -> Result<Self> {
        let indices: Vec<usize> = self
            .metadata
            .iter()
            .filter(|(_, meta)| mask.contains(meta.latitude, meta.longitude))
            .map(|(idx, _)| *idx)
            .collect();

        let mut new = self.rebuild(&indices, None, false)?;
        new.add_history(format!("region: {}", mask.name()));
        info!(
            "Region {}: {} of {} metadata blocks inside",
            mask.name(),
            new.metadata.len(),
            self.metadata.len()
        );
        Ok(new)
    }

    /// Fill in missing countries from coordinates (in place)
    ///
    /// Returns the number of blocks whose country was set.
    pub fn check_set_country(&mut self, geocoder: &dyn ReverseGeocoder) -> usize {
        let mut updated = 0;
        for (idx, meta) in self.metadata.iter_mut() {
            if meta.country.is_some() || !meta.has_location() {
                continue;
            }
            match geocoder.country(meta.latitude, meta.longitude) {
                Some(country) => {
                    meta.country = Some(country);
                    updated += 1;
                }
                None => debug!("No country found for block {} ({})", idx, meta.station_name),
            }
        }
        if updated > 0 {
            info!("Set country for {} metadata blocks", updated);
        }
        updated
    }

    /// New container with stations in one of the given countries
    ///
    /// Countries already stored on a block are used first. Blocks without
    /// one are looked up with the geocoder (if any) and the result is stored
    /// on this container's blocks, so later calls do not repeat the lookup.
    /// No rows of this container change.
    pub fn filter_by_country(
        &mut self,
        countries: &[&str],
        geocoder: Option<&dyn ReverseGeocoder>,
    ) -> Result<Self> {
        if let Some(geocoder) = geocoder {
            self.check_set_country(geocoder);
        }
        let filter = MetaFilter::new().with(
            meta_keys::COUNTRY,
            Predicate::one_of(countries.iter().copied()),
        );
        self.filter_by_meta(&filter)
    }

    /// Blocks of `other` at the same station as blocks of this container
    ///
    /// Both blocks must hold rows of every variable in `vars`. With
    /// `check_coordinates`, stations further apart than `max_diff_km` do not
    /// match. Returns this container's block index -> `other`'s block index.
    pub fn find_common_stations(
        &self,
        other: &UngriddedData,
        vars: &[&str],
        check_coordinates: bool,
        max_diff_km: f64,
    ) -> Result<BTreeMap<usize, usize>> {
        for var_name in vars {
            if !self.var_idx.contains_key(*var_name) || !other.var_idx.contains_key(*var_name) {
                return Err(Error::variable_not_available(*var_name));
            }
        }

        let has_vars = |data: &UngriddedData, idx: &usize| {
            data.meta_idx.get(idx).is_some_and(|rows| {
                vars.iter()
                    .all(|v| rows.get(*v).is_some_and(|r| !r.is_empty()))
            })
        };
        let close = |a: &StationMeta, b: &StationMeta| {
            !check_coordinates
                || haversine_km(a.latitude, a.longitude, b.latitude, b.longitude) <= max_diff_km
        };

        let mut common = BTreeMap::new();
        for (idx, meta) in &self.metadata {
            if !has_vars(self, idx) {
                continue;
            }
            let found = other.metadata.iter().find(|(other_idx, other_meta)| {
                other_meta.station_name == meta.station_name
                    && has_vars(other, other_idx)
                    && close(meta, other_meta)
            });
            if let Some((other_idx, _)) = found {
                common.insert(*idx, *other_idx);
            }
        }

        info!(
            "Found {} common stations ({} and {} blocks)",
            common.len(),
            self.metadata.len(),
            other.metadata.len()
        );
        Ok(common)
    }
}
