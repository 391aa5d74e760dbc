//! Building the container from station records
//!
//! Rows are written in bulk per (record, variable) into a pre-allocated,
//! NaN-filled buffer that grows in chunks. The buffer is truncated to the
//! populated rows once all records are written.

use super::{UngriddedData, VarRows, to_epoch};
use crate::app::models::{StationRecord, VarInfo};
use crate::config::IngestionConfig;
use crate::constants::columns;
use crate::Result;
use ndarray::{Array1, Array2, ArrayView1, s};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Growable row buffer used while ingesting
pub(crate) struct RowBuffer {
    data: Array2<f64>,
    cursor: usize,
    chunk_size: usize,
    growth_steps: usize,
}

impl RowBuffer {
    /// Pre-allocate one chunk of NaN rows
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            data: Array2::from_elem((chunk_size, columns::COUNT), f64::NAN),
            cursor: 0,
            chunk_size,
            growth_steps: 0,
        }
    }

    /// Continue writing after the rows of an existing array
    pub(crate) fn from_existing(existing: Array2<f64>, chunk_size: usize) -> Self {
        let cursor = existing.nrows();
        Self {
            data: existing,
            cursor,
            chunk_size,
            growth_steps: 0,
        }
    }

    /// Make room for `additional` rows, growing by at least one chunk
    pub(crate) fn reserve(&mut self, additional: usize) {
        let required = self.cursor + additional;
        let capacity = self.data.nrows();
        if required <= capacity {
            return;
        }

        let grow = additional.max(self.chunk_size);
        let mut grown = Array2::from_elem((capacity + grow, columns::COUNT), f64::NAN);
        grown.slice_mut(s![..capacity, ..]).assign(&self.data);
        self.data = grown;
        self.growth_steps += 1;
        debug!(
            "Grew data buffer by {} rows to capacity {}",
            grow,
            self.data.nrows()
        );
    }

    /// Number of rows written so far
    pub(crate) fn len(&self) -> usize {
        self.cursor
    }

    /// Truncate to the populated rows
    pub(crate) fn finish(self) -> Array2<f64> {
        debug!(
            "Finishing data buffer: {} rows used of {} ({} growth steps)",
            self.cursor,
            self.data.nrows(),
            self.growth_steps
        );
        self.data.slice(s![..self.cursor, ..]).to_owned()
    }
}

impl UngriddedData {
    /// Build a container from station records
    ///
    /// Every record becomes one metadata block with a sequential index
    /// starting at 0. Records are validated before any row is written; a
    /// record whose time index and values differ in length fails the call.
    pub fn from_station_data(records: &[StationRecord], config: &IngestionConfig) -> Result<Self> {
        let mut data = UngriddedData::with_chunk_size(config.chunk_size);
        data.append_station_records(records, config)?;
        Ok(data)
    }

    /// Ingest further station records into this container (in place)
    ///
    /// New metadata blocks are numbered after the highest existing index.
    pub fn append_station_records(
        &mut self,
        records: &[StationRecord],
        config: &IngestionConfig,
    ) -> Result<()> {
        for record in records {
            record.validate()?;
        }

        let existing = std::mem::replace(
            &mut self.data,
            Array2::from_elem((0, columns::COUNT), f64::NAN),
        );
        let mut buffer = if existing.nrows() == 0 {
            RowBuffer::new(config.chunk_size.max(1))
        } else {
            RowBuffer::from_existing(existing, config.chunk_size.max(1))
        };

        let mut meta_key = self.last_meta_idx().map_or(0, |last| last + 1);
        let add_meta_keys = config.add_meta_keys.as_deref();

        for record in records {
            self.add_record(record, meta_key, add_meta_keys, &mut buffer);
            meta_key += 1;
        }

        let total_rows = buffer.len();
        self.data = buffer.finish();

        info!(
            "Ingested {} station records: {} rows, {} metadata blocks, {} variables",
            records.len(),
            total_rows,
            self.metadata.len(),
            self.var_idx.len()
        );

        self.check_index()
    }

    /// Write one validated record as metadata block `meta_key`
    fn add_record(
        &mut self,
        record: &StationRecord,
        meta_key: usize,
        add_meta_keys: Option<&[String]>,
        buffer: &mut RowBuffer,
    ) {
        let mut meta = record.to_meta(add_meta_keys);
        let mut var_rows: VarRows = BTreeMap::new();

        for (var_name, series) in &record.variables {
            let info = record.var_info.get(var_name).cloned().unwrap_or_else(|| VarInfo {
                ts_type: record.ts_type,
                ..Default::default()
            });
            meta.var_info.insert(var_name.clone(), info);

            if series.is_empty() {
                debug!(
                    "Skipping empty variable {} of station {}",
                    var_name, record.station_name
                );
                continue;
            }

            let next_var = self.var_idx.values().max().map_or(0, |max| max + 1);
            let var_num = *self.var_idx.entry(var_name.clone()).or_insert(next_var);

            let times = series.time.as_deref().unwrap_or(&record.dtime);
            let num = series.len();
            buffer.reserve(num);
            let start = buffer.cursor;
            let stop = start + num;

            let mut block = buffer.data.slice_mut(s![start..stop, ..]);
            block.column_mut(columns::META_IDX).fill(meta_key as f64);
            block.column_mut(columns::LATITUDE).fill(meta.latitude);
            block.column_mut(columns::LONGITUDE).fill(meta.longitude);
            block.column_mut(columns::ALTITUDE).fill(meta.altitude);
            block.column_mut(columns::VAR_IDX).fill(var_num as f64);
            block
                .column_mut(columns::TIME)
                .assign(&Array1::from_vec(times.iter().map(to_epoch).collect()));
            block
                .column_mut(columns::VALUE)
                .assign(&ArrayView1::from(&series.values[..]));

            if let Some(errors) = &series.errors {
                block
                    .column_mut(columns::ERROR)
                    .assign(&ArrayView1::from(&errors[..]));
            }
            if let Some(flags) = &series.flags {
                block.column_mut(columns::FLAG).assign(&Array1::from_vec(
                    flags.iter().map(|&f| if f { 1.0 } else { 0.0 }).collect(),
                ));
            }
            if let Some(value_altitude) = &series.value_altitude {
                block
                    .column_mut(columns::VALUE_ALTITUDE)
                    .assign(&ArrayView1::from(&value_altitude[..]));
            }
            if let (None, Some(stop_time)) = (&series.time, &record.stop_time) {
                block
                    .column_mut(columns::STOP_TIME)
                    .assign(&Array1::from_vec(stop_time.iter().map(to_epoch).collect()));
            }

            var_rows.insert(var_name.clone(), (start..stop).collect());
            buffer.cursor = stop;
        }

        if let Some(revision) = &record.data_revision {
            self.data_revision
                .insert(record.data_id.clone(), revision.clone());
        }

        self.metadata.insert(meta_key, meta);
        self.meta_idx.insert(meta_key, var_rows);
    }
}
