//! Variable extraction, outlier removal and flag masking
//!
//! Outlier removal can stash the removed values in the trash column. This is
//! one-shot per variable: a second trash operation on a variable whose trash
//! column still holds values fails until [`UngriddedData::empty_trash`] is
//! called.

use super::UngriddedData;
use crate::config::OutlierConfig;
use crate::constants::{FLAG_INVALID, columns};
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

impl UngriddedData {
    /// New container holding only one variable (renumbered to index 0)
    pub fn extract_var(&self, var_name: &str) -> Result<Self> {
        self.extract_vars(&[var_name])
    }

    /// New container holding only the given variables
    ///
    /// Variables are renumbered 0..n in the requested order, blocks left
    /// without rows are dropped and `var_info` only lists kept variables.
    pub fn extract_vars(&self, var_names: &[&str]) -> Result<Self> {
        let mut var_map: BTreeMap<String, usize> = BTreeMap::new();
        for var_name in var_names {
            if !self.var_idx.contains_key(*var_name) {
                return Err(Error::variable_not_available(*var_name));
            }
            let next = var_map.len();
            var_map.entry(var_name.to_string()).or_insert(next);
        }

        let indices: Vec<usize> = self.metadata.keys().copied().collect();
        let mut new = self.rebuild(&indices, Some(&var_map), true)?;
        new.add_history(format!("extract_vars: {}", var_names.join(", ")));

        debug!(
            "Extracted {:?}: {} rows in {} blocks",
            var_names,
            new.data.nrows(),
            new.metadata.len()
        );
        Ok(new)
    }

    /// New container with values of `var_name` outside `[low, high]` set to NaN
    pub fn remove_outliers(
        &self,
        var_name: &str,
        low: f64,
        high: f64,
        move_to_trash: bool,
    ) -> Result<Self> {
        let mut new = self.clone();
        new.remove_outliers_in_place(var_name, low, high, move_to_trash)?;
        Ok(new)
    }

    /// Remove outliers using the configured valid range of the variable
    pub fn remove_outliers_configured(
        &self,
        var_name: &str,
        outliers: &OutlierConfig,
        move_to_trash: bool,
    ) -> Result<Self> {
        let (low, high) = outliers
            .range(var_name)
            .ok_or_else(|| Error::invalid_filter(var_name, "no valid range configured"))?;
        self.remove_outliers(var_name, low, high, move_to_trash)
    }

    /// Set values of `var_name` outside `[low, high]` to NaN (in place)
    ///
    /// With `move_to_trash`, removed values are copied to the trash column
    /// first. Returns the number of removed values.
    pub fn remove_outliers_in_place(
        &mut self,
        var_name: &str,
        low: f64,
        high: f64,
        move_to_trash: bool,
    ) -> Result<usize> {
        if low.is_nan() || high.is_nan() || low > high {
            return Err(Error::invalid_filter(
                var_name,
                format!("malformed outlier range [{}, {}]", low, high),
            ));
        }
        if !self.var_idx.contains_key(var_name) {
            return Err(Error::variable_not_available(var_name));
        }

        let rows = self.rows_of_var(var_name);
        if move_to_trash && rows.iter().any(|&r| self.data[[r, columns::TRASH]].is_finite()) {
            return Err(Error::TrashNotEmpty {
                var_name: var_name.to_string(),
            });
        }

        let mut removed = 0;
        for row in rows {
            let value = self.data[[row, columns::VALUE]];
            if value.is_finite() && (value < low || value > high) {
                if move_to_trash {
                    self.data[[row, columns::TRASH]] = value;
                }
                self.data[[row, columns::VALUE]] = f64::NAN;
                removed += 1;
            }
        }

        info!(
            "Removed {} outliers of {} outside [{}, {}]",
            removed, var_name, low, high
        );
        self.add_history(format!(
            "remove_outliers: {} [{}, {}]{}",
            var_name,
            low,
            high,
            if move_to_trash { " (trash)" } else { "" }
        ));
        Ok(removed)
    }

    /// Clear the trash column (in place)
    pub fn empty_trash(&mut self) {
        self.data.column_mut(columns::TRASH).fill(f64::NAN);
        self.add_history("empty_trash");
    }

    /// Values held in the trash column for a variable
    pub fn trash_values(&self, var_name: &str) -> Result<Vec<f64>> {
        if !self.var_idx.contains_key(var_name) {
            return Err(Error::variable_not_available(var_name));
        }
        Ok(self
            .rows_of_var(var_name)
            .into_iter()
            .map(|row| self.data[[row, columns::TRASH]])
            .filter(|v| v.is_finite())
            .collect())
    }

    /// New container with flagged values set to NaN
    pub fn set_flags_nan(&self) -> Result<Self> {
        let mut new = self.clone();
        new.set_flags_nan_in_place()?;
        Ok(new)
    }

    /// Set flagged values to NaN (in place)
    ///
    /// Fails with [`Error::NoFlagData`] if no row carries flag information.
    /// Returns the number of masked values.
    pub fn set_flags_nan_in_place(&mut self) -> Result<usize> {
        if !self.data.column(columns::FLAG).iter().any(|f| f.is_finite()) {
            return Err(Error::NoFlagData);
        }

        let mut masked = 0;
        for mut row in self.data.rows_mut() {
            if row[columns::FLAG] == FLAG_INVALID && !row[columns::VALUE].is_nan() {
                row[columns::VALUE] = f64::NAN;
                masked += 1;
            }
        }

        info!("Set {} flagged values to NaN", masked);
        self.add_history("set_flags_nan");
        Ok(masked)
    }
}
