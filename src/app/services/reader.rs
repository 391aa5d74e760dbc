//! Observation reader interface
//!
//! Network-specific readers implement [`ObservationReader`]: they know their
//! dataset id, which files belong to the dataset and how to turn one file into
//! station records. File discovery, auxiliary variable computation, error
//! tolerant bulk reading and cache use are provided on top.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use ungridded_obs::app::services::reader::ObservationReader;
//! use ungridded_obs::config::IngestionConfig;
//! # use std::path::Path;
//!
//! # fn example(reader: &dyn ObservationReader) -> ungridded_obs::Result<()> {
//! let files = reader.get_file_list(Path::new("/data/aeronet"))?;
//! let data = reader.read(&["od550aer"], &files, &IngestionConfig::default())?;
//! println!("{} rows from {} files", data.shape().0, files.len());
//! # Ok(())
//! # }
//! ```

use crate::app::models::{StationRecord, VarInfo, VariableSeries};
use crate::app::services::cache_handler::{
    CacheHandler, CacheHeader, CacheLookup, newest_source_file,
};
use crate::app::services::ungridded::UngriddedData;
use crate::config::IngestionConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Variable computed from other variables of the same record
#[derive(Debug, Clone)]
pub struct AuxVariable {
    pub name: String,
    /// Variables that must be present in the record
    pub requires: Vec<String>,
    pub compute: fn(&StationRecord) -> Result<VariableSeries>,
}

impl AuxVariable {
    fn applies_to(&self, record: &StationRecord) -> bool {
        self.requires
            .iter()
            .all(|v| record.variables.contains_key(v))
    }
}

/// Reader of one observation dataset
pub trait ObservationReader {
    /// Dataset identifier written into every record
    fn data_id(&self) -> &str;

    /// Glob pattern matching the dataset's file names
    fn file_mask(&self) -> &str;

    /// Reader version (part of cache identity)
    fn version(&self) -> &str;

    /// Variables read directly from files
    fn provides_variables(&self) -> Vec<String>;

    /// Variables computed from provided ones
    fn auxiliary_variables(&self) -> Vec<AuxVariable> {
        Vec::new()
    }

    /// Read the requested variables of one file
    fn read_file(&self, path: &Path, vars: &[String]) -> Result<Vec<StationRecord>>;

    /// Revision of the source data, if the dataset publishes one
    fn data_revision(&self, _dir: &Path) -> Option<String> {
        None
    }

    /// Files of the dataset in a directory, sorted
    fn get_file_list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let pattern = dir.join(self.file_mask());
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|e| {
            Error::configuration(format!("Invalid file mask '{}': {}", pattern, e))
        })?;

        let mut files: Vec<PathBuf> = paths
            .filter_map(|p| p.ok())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        debug!("Found {} files matching {}", files.len(), pattern);
        Ok(files)
    }

    /// Read files into a container
    ///
    /// Files that fail to read and malformed records are skipped with a
    /// warning; the call only fails if no valid record remains.
    fn read(
        &self,
        vars: &[&str],
        files: &[PathBuf],
        config: &IngestionConfig,
    ) -> Result<UngriddedData> {
        let provided = self.provides_variables();
        let aux: Vec<AuxVariable> = self
            .auxiliary_variables()
            .into_iter()
            .filter(|a| vars.contains(&a.name.as_str()))
            .collect();

        let mut to_read: Vec<String> = Vec::new();
        for var in vars {
            if provided.iter().any(|p| p == var) {
                to_read.push(var.to_string());
            } else if let Some(a) = aux.iter().find(|a| a.name == *var) {
                to_read.extend(a.requires.iter().cloned());
            } else {
                return Err(Error::variable_not_available(*var));
            }
        }
        to_read.sort();
        to_read.dedup();

        let mut records = Vec::new();
        let mut failed = 0;
        let mut malformed = 0;
        for path in files {
            match self.read_file(path, &to_read) {
                Ok(file_records) => {
                    for mut record in file_records {
                        compute_aux_variables(&mut record, &aux);
                        record.variables.retain(|name, _| vars.contains(&name.as_str()));
                        record.var_info.retain(|name, _| vars.contains(&name.as_str()));
                        if record.variables.is_empty() {
                            continue;
                        }
                        if record.data_id.is_empty() {
                            record.data_id = self.data_id().to_string();
                        }
                        if let Err(e) = record.validate() {
                            warn!("Skipping record in {}: {}", path.display(), e);
                            malformed += 1;
                            continue;
                        }
                        records.push(record);
                    }
                }
                Err(e @ Error::Consistency { .. }) => return Err(e),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!(
                "{} of {} files of {} could not be read",
                failed,
                files.len(),
                self.data_id()
            );
        }
        if malformed > 0 {
            warn!(
                "{} malformed station records of {} were skipped",
                malformed,
                self.data_id()
            );
        }
        if records.is_empty() {
            return Err(Error::data_coverage(format!(
                "no records for {:?} in {} files of {}",
                vars,
                files.len(),
                self.data_id()
            )));
        }

        info!(
            "Read {} station records of {} from {} files",
            records.len(),
            self.data_id(),
            files.len() - failed
        );
        UngriddedData::from_station_data(&records, config)
    }

    /// Cache header describing the current state of a source directory
    fn cache_header(&self, dir: &Path) -> Result<CacheHeader> {
        let mask = glob::Pattern::new(self.file_mask()).map_err(|e| {
            Error::configuration(format!("Invalid file mask '{}': {}", self.file_mask(), e))
        })?;
        let newest = newest_source_file(dir, Some(&mask))?;
        Ok(CacheHeader::new(
            self.version(),
            self.data_revision(dir),
            newest.as_ref(),
        ))
    }

    /// Read variables, using valid cache files and caching what was read
    ///
    /// A failing cache write is logged and does not fail the read.
    fn read_with_cache(
        &self,
        dir: &Path,
        vars: &[&str],
        cache: &CacheHandler,
        config: &IngestionConfig,
    ) -> Result<UngriddedData> {
        let header = self.cache_header(dir)?;
        let mut data = UngriddedData::with_chunk_size(config.chunk_size);
        let mut to_read: Vec<&str> = Vec::new();

        for var in vars {
            match cache.load(self.data_id(), var, &header)? {
                CacheLookup::Hit(cached) => data.append(cached)?,
                CacheLookup::Missing | CacheLookup::Stale { .. } => to_read.push(var),
            }
        }

        if !to_read.is_empty() {
            let files = self.get_file_list(dir)?;
            let read = self.read(&to_read, &files, config)?;
            let available = read.contains_vars();
            for var in &to_read {
                if !available.iter().any(|v| v == var) {
                    continue;
                }
                if let Err(e) = cache.write(&read, self.data_id(), var, &header) {
                    warn!("Cannot cache {}/{}: {}", self.data_id(), var, e);
                }
            }
            data.append(read)?;
        }

        Ok(data)
    }
}

/// Compute requested auxiliary variables of a record in place
fn compute_aux_variables(record: &mut StationRecord, aux: &[AuxVariable]) {
    for variable in aux {
        if record.variables.contains_key(&variable.name) || !variable.applies_to(record) {
            continue;
        }
        match (variable.compute)(record) {
            Ok(series) => {
                record.var_info.entry(variable.name.clone()).or_insert(VarInfo {
                    ts_type: record.ts_type,
                    ..Default::default()
                });
                record.variables.insert(variable.name.clone(), series);
            }
            Err(e) => warn!(
                "Cannot compute {} at {}: {}",
                variable.name, record.station_name, e
            ),
        }
    }
}
