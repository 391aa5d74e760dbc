//! Merging containers and coalescing near-identical metadata blocks

use super::UngriddedData;
use crate::app::models::MetaValue;
use crate::constants::{META_NUMERIC_RTOL, columns};
use crate::{Error, Result};
use ndarray::{Axis, concatenate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

impl UngriddedData {
    /// New container holding the observations of both containers
    pub fn merge(&self, other: &UngriddedData) -> Result<Self> {
        let mut new = self.clone();
        new.append(other.clone())?;
        Ok(new)
    }

    /// Append another container (in place)
    ///
    /// Metadata block indices of `other` are offset past the highest index of
    /// this container. Variables known here keep this container's index; new
    /// variables keep theirs if free and otherwise get the lowest free index.
    /// Appending to an empty container is equivalent to copying `other`.
    pub fn append(&mut self, mut other: UngriddedData) -> Result<()> {
        if self.metadata.is_empty() && self.data.nrows() == 0 {
            let mut history = std::mem::take(&mut self.filter_hist);
            history.append(&mut other.filter_hist);
            let chunk_size = self.chunk_size;
            *self = other;
            self.filter_hist = history;
            self.chunk_size = chunk_size;
            self.add_history("merge: copy into empty container");
            return Ok(());
        }

        let meta_offset = self.last_meta_idx().map_or(0, |last| last + 1);
        let row_offset = self.data.nrows();
        let appended_rows = other.data.nrows();
        let appended_blocks = other.metadata.len();

        let mut var_map: BTreeMap<usize, usize> = BTreeMap::new();
        let mut used: BTreeSet<usize> = self.var_idx.values().copied().collect();
        let mut other_vars: Vec<(&String, &usize)> = other.var_idx.iter().collect();
        other_vars.sort_by_key(|(_, num)| **num);

        for (var_name, num) in other_vars {
            let new_num = match self.var_idx.get(var_name) {
                Some(existing) => *existing,
                None if !used.contains(num) => *num,
                None => {
                    let free = (0..).find(|n| !used.contains(n)).unwrap_or(usize::MAX);
                    debug!("Renumbering variable {} from {} to {}", var_name, num, free);
                    free
                }
            };
            used.insert(new_num);
            self.var_idx.insert(var_name.clone(), new_num);
            var_map.insert(*num, new_num);
        }

        for mut row in other.data.rows_mut() {
            if !row[columns::META_IDX].is_nan() {
                row[columns::META_IDX] += meta_offset as f64;
            }
            let var = row[columns::VAR_IDX];
            if !var.is_nan() {
                let mapped = var_map.get(&(var as usize)).ok_or_else(|| {
                    Error::consistency(format!("variable index {} missing from table", var))
                })?;
                row[columns::VAR_IDX] = *mapped as f64;
            }
        }

        self.data = concatenate(Axis(0), &[self.data.view(), other.data.view()])
            .map_err(|e| Error::consistency(format!("cannot stack data arrays: {}", e)))?;

        for (meta_key, meta) in other.metadata {
            self.metadata.insert(meta_key + meta_offset, meta);
        }
        for (meta_key, mut vars) in other.meta_idx {
            for rows in vars.values_mut() {
                rows.iter_mut().for_each(|r| *r += row_offset);
            }
            self.meta_idx.insert(meta_key + meta_offset, vars);
        }

        for (data_id, revision) in other.data_revision {
            match self.data_revision.get(&data_id) {
                Some(existing) if *existing != revision => warn!(
                    "Data revision conflict for {}: keeping {}, ignoring {}",
                    data_id, existing, revision
                ),
                Some(_) => {}
                None => {
                    self.data_revision.insert(data_id, revision);
                }
            }
        }

        self.add_history(format!(
            "merge: appended {} rows from {} metadata blocks",
            appended_rows, appended_blocks
        ));
        info!(
            "Merged containers: {} rows, {} metadata blocks, {} variables",
            self.data.nrows(),
            self.metadata.len(),
            self.var_idx.len()
        );
        self.check_index()
    }

    /// Groups of metadata blocks equal except for `ignore_keys`
    ///
    /// Each group is sorted ascending; singleton groups are included.
    pub fn find_common_meta(&self, ignore_keys: &[&str]) -> Vec<Vec<usize>> {
        let ignore: Vec<String> = ignore_keys.iter().map(|k| k.to_string()).collect();
        let mut assigned: BTreeSet<usize> = BTreeSet::new();
        let mut groups = Vec::new();

        for (idx, meta) in &self.metadata {
            if !assigned.insert(*idx) {
                continue;
            }
            let mut group = vec![*idx];
            for (other_idx, other_meta) in self.metadata.range(idx + 1..) {
                if assigned.contains(other_idx) {
                    continue;
                }
                if meta.same_as(other_meta, &ignore, META_NUMERIC_RTOL) {
                    assigned.insert(*other_idx);
                    group.push(*other_idx);
                }
            }
            groups.push(group);
        }
        groups
    }

    /// New container with metadata blocks that differ only in `ignore_keys` merged
    ///
    /// The surviving block keeps the first block's attributes, the union of
    /// `var_info` and all rows. Differing values of ignored extra attributes
    /// are collected into a list.
    pub fn merge_common_meta(&self, ignore_keys: &[&str]) -> Result<Self> {
        let groups = self.find_common_meta(ignore_keys);
        let mut data = self.clone();
        let mut survivors = Vec::with_capacity(groups.len());
        let mut coalesced = 0;

        for group in groups {
            let survivor = group[0];
            survivors.push(survivor);
            if group.len() == 1 {
                continue;
            }
            coalesced += group.len() - 1;

            for absorbed in &group[1..] {
                let meta = data.metadata.remove(absorbed).ok_or_else(|| {
                    Error::consistency(format!("metadata block {} does not exist", absorbed))
                })?;
                let vars = data.meta_idx.remove(absorbed).unwrap_or_default();

                for rows in vars.values() {
                    for &row in rows {
                        data.data[[row, columns::META_IDX]] = survivor as f64;
                    }
                }

                let target_rows = data.meta_idx.entry(survivor).or_default();
                for (var_name, rows) in vars {
                    target_rows.entry(var_name).or_default().extend(rows);
                }

                let target = data.metadata.get_mut(&survivor).ok_or_else(|| {
                    Error::consistency(format!("metadata block {} does not exist", survivor))
                })?;
                for (var_name, info) in meta.var_info {
                    target.var_info.entry(var_name).or_insert(info);
                }
                for key in ignore_keys {
                    let Some(value) = meta.extra.get(*key) else {
                        continue;
                    };
                    match target.extra.get_mut(*key) {
                        Some(MetaValue::List(values)) => {
                            if !values.contains(value) {
                                values.push(value.clone());
                            }
                        }
                        Some(existing) if existing != value => {
                            *existing = MetaValue::List(vec![existing.clone(), value.clone()]);
                        }
                        Some(_) => {}
                        None => {
                            target.extra.insert(key.to_string(), value.clone());
                        }
                    }
                }
            }
        }

        let mut new = data.rebuild(&survivors, None, false)?;
        new.add_history(format!(
            "merge_common_meta: {} blocks coalesced (ignoring {})",
            coalesced,
            ignore_keys.join(", ")
        ));
        info!(
            "Coalesced {} metadata blocks, {} remain",
            coalesced,
            new.metadata.len()
        );
        Ok(new)
    }
}
