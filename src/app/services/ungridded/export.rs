//! Long-format table export
//!
//! One output row per observation, ordered by metadata block, variable and
//! row position, with the station identity resolved from the metadata.

use super::UngriddedData;
use crate::constants::columns;
use crate::{Error, Result};
use polars::prelude::{
    Column, CsvWriter, DataFrame, DataType, ParquetCompression, ParquetWriter, SerWriter,
    TimeUnit,
};
use std::fs::File;
use std::path::Path;
use tracing::info;

fn epoch_micros(seconds: f64) -> Option<i64> {
    seconds.is_finite().then(|| (seconds * 1e6).round() as i64)
}

impl UngriddedData {
    /// Long-format DataFrame of all observations
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let nrows = self.data.nrows();
        let mut meta_idx: Vec<u64> = Vec::with_capacity(nrows);
        let mut data_id: Vec<String> = Vec::with_capacity(nrows);
        let mut station_name: Vec<String> = Vec::with_capacity(nrows);
        let mut variable: Vec<String> = Vec::with_capacity(nrows);
        let mut time: Vec<Option<i64>> = Vec::with_capacity(nrows);
        let mut stop_time: Vec<Option<i64>> = Vec::with_capacity(nrows);
        let mut numeric: Vec<(usize, Vec<f64>)> = [
            columns::LATITUDE,
            columns::LONGITUDE,
            columns::ALTITUDE,
            columns::VALUE,
            columns::VALUE_ALTITUDE,
            columns::ERROR,
            columns::FLAG,
        ]
        .into_iter()
        .map(|c| (c, Vec::with_capacity(nrows)))
        .collect();

        for (meta_key, vars) in &self.meta_idx {
            let meta = self.metadata.get(meta_key).ok_or_else(|| {
                Error::consistency(format!("metadata block {} does not exist", meta_key))
            })?;
            for (var_name, rows) in vars {
                for &row in rows {
                    meta_idx.push(*meta_key as u64);
                    data_id.push(meta.data_id.clone());
                    station_name.push(meta.station_name.clone());
                    variable.push(var_name.clone());
                    time.push(epoch_micros(self.data[[row, columns::TIME]]));
                    stop_time.push(epoch_micros(self.data[[row, columns::STOP_TIME]]));
                    for (column, values) in numeric.iter_mut() {
                        values.push(self.data[[row, *column]]);
                    }
                }
            }
        }

        let datetime = DataType::Datetime(TimeUnit::Microseconds, None);
        let mut frame_columns = vec![
            Column::new("meta_idx".into(), meta_idx),
            Column::new("data_id".into(), data_id),
            Column::new("station_name".into(), station_name),
            Column::new("variable".into(), variable),
            Column::new("time".into(), time)
                .cast(&datetime)
                .map_err(|e| Error::export("Failed to convert time column", e))?,
            Column::new("stop_time".into(), stop_time)
                .cast(&datetime)
                .map_err(|e| Error::export("Failed to convert stop_time column", e))?,
        ];
        for (column, values) in numeric {
            frame_columns.push(Column::new(columns::NAMES[column].into(), values));
        }

        DataFrame::new(frame_columns).map_err(|e| Error::export("Failed to build DataFrame", e))
    }

    /// Write the long-format table to a Parquet file (Snappy compressed)
    ///
    /// Returns the number of written rows.
    pub fn write_parquet(&self, path: &Path) -> Result<usize> {
        let mut frame = self.to_dataframe()?;
        let file = File::create(path)
            .map_err(|e| Error::io(format!("Failed to create '{}'", path.display()), e))?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Snappy)
            .finish(&mut frame)
            .map_err(|e| Error::export(format!("Failed to write '{}'", path.display()), e))?;

        info!("Wrote {} rows to {}", frame.height(), path.display());
        Ok(frame.height())
    }

    /// Write the long-format table to a CSV file
    pub fn write_csv(&self, path: &Path) -> Result<usize> {
        let mut frame = self.to_dataframe()?;
        let mut file = File::create(path)
            .map_err(|e| Error::io(format!("Failed to create '{}'", path.display()), e))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut frame)
            .map_err(|e| Error::export(format!("Failed to write '{}'", path.display()), e))?;

        info!("Wrote {} rows to {}", frame.height(), path.display());
        Ok(frame.height())
    }
}
