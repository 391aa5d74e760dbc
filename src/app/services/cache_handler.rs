//! Version-checked on-disk cache of containers
//!
//! Each cache file holds one dataset/variable subset of a container, named
//! `<data_id>_<var>.bin`. The file starts with a [`CacheHeader`] followed by
//! the serialized container. On load the stored header is compared field by
//! field with the header expected for the current source files and library;
//! any difference makes the file stale. Staleness is reported, never raised.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use ungridded_obs::app::services::cache_handler::{CacheHandler, CacheHeader, CacheLookup};
//! use ungridded_obs::config::CacheConfig;
//!
//! # fn example(data: &ungridded_obs::UngriddedData) -> ungridded_obs::Result<()> {
//! let handler = CacheHandler::new(&CacheConfig::default());
//! let header = CacheHeader::new("1.0", None, None);
//! handler.write(data, "AeronetSunV3Lev2.daily", "od550aer", &header)?;
//!
//! match handler.load("AeronetSunV3Lev2.daily", "od550aer", &header)? {
//!     CacheLookup::Hit(cached) => println!("{} rows from cache", cached.shape().0),
//!     CacheLookup::Stale { reasons } => println!("stale: {}", reasons.join(", ")),
//!     CacheLookup::Missing => println!("not cached"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::app::services::ungridded::UngriddedData;
use crate::config::CacheConfig;
use crate::constants::{
    CACHE_FILE_EXTENSION, CACHE_WRITER_VERSION, LIBRARY_VERSION, UNGRIDDED_DATA_VERSION,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Newest file of a source directory
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFileInfo {
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// Find the most recently modified file below `dir`
///
/// With `file_mask`, only file names matching the pattern are considered.
pub fn newest_source_file(
    dir: &Path,
    file_mask: Option<&glob::Pattern>,
) -> Result<Option<SourceFileInfo>> {
    if !dir.is_dir() {
        return Err(Error::io(
            format!("Source directory does not exist: {}", dir.display()),
            std::io::Error::new(std::io::ErrorKind::NotFound, "Directory not found"),
        ));
    }

    let mut newest: Option<SourceFileInfo> = None;
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_mask.is_some_and(|mask| !mask.matches(&name)) {
            continue;
        }
        let modified: DateTime<Utc> = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::from)
            .unwrap_or(DateTime::UNIX_EPOCH);

        // Equal modification times are ordered by name
        if newest
            .as_ref()
            .is_none_or(|n| (modified, &name) > (n.modified, &n.name))
        {
            newest = Some(SourceFileInfo { name, modified });
        }
    }

    debug!("Newest source file in {}: {:?}", dir.display(), newest);
    Ok(newest)
}

/// Identity of a cache file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub library_version: String,
    pub newest_file: Option<String>,
    pub newest_file_mtime: Option<DateTime<Utc>>,
    pub data_revision: Option<String>,
    pub reader_version: String,
    pub ungridded_version: String,
    pub cacher_version: String,
}

impl CacheHeader {
    /// Header for the current library with the given source state
    pub fn new(
        reader_version: impl Into<String>,
        data_revision: Option<String>,
        newest: Option<&SourceFileInfo>,
    ) -> Self {
        Self {
            library_version: LIBRARY_VERSION.to_string(),
            newest_file: newest.map(|f| f.name.clone()),
            newest_file_mtime: newest.map(|f| f.modified),
            data_revision,
            reader_version: reader_version.into(),
            ungridded_version: UNGRIDDED_DATA_VERSION.to_string(),
            cacher_version: CACHE_WRITER_VERSION.to_string(),
        }
    }

    /// Fields that differ from `expected`, as "field: stored != expected"
    pub fn mismatches(&self, expected: &CacheHeader) -> Vec<String> {
        fn show<T: std::fmt::Debug>(value: &T) -> String {
            format!("{:?}", value)
        }
        let fields = [
            (
                "library_version",
                show(&self.library_version),
                show(&expected.library_version),
            ),
            ("newest_file", show(&self.newest_file), show(&expected.newest_file)),
            (
                "newest_file_mtime",
                show(&self.newest_file_mtime),
                show(&expected.newest_file_mtime),
            ),
            (
                "data_revision",
                show(&self.data_revision),
                show(&expected.data_revision),
            ),
            (
                "reader_version",
                show(&self.reader_version),
                show(&expected.reader_version),
            ),
            (
                "ungridded_version",
                show(&self.ungridded_version),
                show(&expected.ungridded_version),
            ),
            (
                "cacher_version",
                show(&self.cacher_version),
                show(&expected.cacher_version),
            ),
        ];
        fields
            .into_iter()
            .filter(|(_, stored, wanted)| stored != wanted)
            .map(|(name, stored, wanted)| format!("{}: {} != {}", name, stored, wanted))
            .collect()
    }
}

/// Outcome of a cache lookup
#[derive(Debug)]
pub enum CacheLookup {
    Hit(UngriddedData),
    Missing,
    Stale { reasons: Vec<String> },
}

/// Reads and writes cache files in one directory
#[derive(Debug, Clone)]
pub struct CacheHandler {
    cache_dir: PathBuf,
    enabled: bool,
    delete_stale: bool,
}

impl CacheHandler {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            enabled: config.enabled,
            delete_stale: config.delete_stale,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache file name of a dataset/variable pair
    pub fn file_name(data_id: &str, var_name: &str) -> String {
        let sanitize = |s: &str| s.replace(['/', '\\'], "_");
        format!(
            "{}_{}.{}",
            sanitize(data_id),
            sanitize(var_name),
            CACHE_FILE_EXTENSION
        )
    }

    pub fn file_path(&self, data_id: &str, var_name: &str) -> PathBuf {
        self.cache_dir.join(Self::file_name(data_id, var_name))
    }

    /// Write the dataset/variable subset of a container
    ///
    /// Returns the written path, or None when caching is disabled.
    pub fn write(
        &self,
        data: &UngriddedData,
        data_id: &str,
        var_name: &str,
        header: &CacheHeader,
    ) -> Result<Option<PathBuf>> {
        if !self.enabled {
            debug!("Cache disabled, not writing {}/{}", data_id, var_name);
            return Ok(None);
        }

        let is_subset = data.contains_datasets() == [data_id]
            && data.contains_vars() == [var_name];
        let subset;
        let data = if is_subset {
            data
        } else {
            subset = data.extract_dataset(data_id)?.extract_var(var_name)?;
            &subset
        };

        fs::create_dir_all(&self.cache_dir).map_err(|e| {
            Error::io(
                format!("Failed to create cache directory '{}'", self.cache_dir.display()),
                e,
            )
        })?;

        let path = self.file_path(data_id, var_name);
        let tmp_path = path.with_extension(format!("{}.tmp", CACHE_FILE_EXTENSION));
        Self::write_file(&tmp_path, header, data)?;
        fs::rename(&tmp_path, &path)
            .map_err(|e| Error::io(format!("Failed to move cache file to '{}'", path.display()), e))?;

        info!(
            "Cached {} rows of {}/{} in {}",
            data.shape().0,
            data_id,
            var_name,
            path.display()
        );
        Ok(Some(path))
    }

    /// Load a cached container if it matches the expected header
    pub fn load(
        &self,
        data_id: &str,
        var_name: &str,
        expected: &CacheHeader,
    ) -> Result<CacheLookup> {
        if !self.enabled {
            return Ok(CacheLookup::Missing);
        }
        let path = self.file_path(data_id, var_name);
        if !path.is_file() {
            debug!("No cache file {}", path.display());
            return Ok(CacheLookup::Missing);
        }

        let file = File::open(&path)
            .map_err(|e| Error::io(format!("Failed to open '{}'", path.display()), e))?;
        let mut reader = BufReader::new(file);

        let reasons = match bincode::deserialize_from::<_, CacheHeader>(&mut reader) {
            Ok(stored) => stored.mismatches(expected),
            Err(e) => vec![format!("unreadable header: {}", e)],
        };
        if !reasons.is_empty() {
            return self.stale(&path, reasons);
        }

        match UngriddedData::read_from(reader) {
            Ok(data) => {
                info!("Loaded {}/{} from cache {}", data_id, var_name, path.display());
                Ok(CacheLookup::Hit(data))
            }
            Err(e) => self.stale(&path, vec![format!("unreadable container: {}", e)]),
        }
    }

    fn stale(&self, path: &Path, reasons: Vec<String>) -> Result<CacheLookup> {
        warn!(
            "Cache file {} is outdated: {}",
            path.display(),
            reasons.join("; ")
        );
        if self.delete_stale {
            fs::remove_file(path)
                .map_err(|e| Error::io(format!("Failed to delete '{}'", path.display()), e))?;
            debug!("Deleted stale cache file {}", path.display());
        }
        Ok(CacheLookup::Stale { reasons })
    }

    /// Delete the cache file of a dataset/variable pair
    pub fn delete(&self, data_id: &str, var_name: &str) -> Result<bool> {
        let path = self.file_path(data_id, var_name);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| Error::io(format!("Failed to delete '{}'", path.display()), e))?;
        Ok(true)
    }

    /// Cache files present in the cache directory
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.cache_dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            Error::io(
                format!("Failed to list '{}'", self.cache_dir.display()),
                e,
            )
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == CACHE_FILE_EXTENSION))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Read header and container of a cache file without validation
    pub fn read_file(path: &Path) -> Result<(CacheHeader, UngriddedData)> {
        let file = File::open(path)
            .map_err(|e| Error::io(format!("Failed to open '{}'", path.display()), e))?;
        let mut reader = BufReader::new(file);
        let header: CacheHeader = bincode::deserialize_from(&mut reader)
            .map_err(|e| Error::serialization("Failed to read cache header", e))?;
        let data = UngriddedData::read_from(reader)?;
        Ok((header, data))
    }

    /// Write a container with its header to an arbitrary path
    pub fn write_file(path: &Path, header: &CacheHeader, data: &UngriddedData) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| Error::io(format!("Failed to create '{}'", path.display()), e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, header)
            .map_err(|e| Error::serialization("Failed to write cache header", e))?;
        data.write_to(&mut writer)?;
        writer
            .flush()
            .map_err(|e| Error::io(format!("Failed to flush '{}'", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(
            CacheHandler::file_name("AeronetSunV3Lev2.daily", "od550aer"),
            "AeronetSunV3Lev2.daily_od550aer.bin"
        );
        assert_eq!(CacheHandler::file_name("a/b", "v"), "a_b_v.bin");
    }

    #[test]
    fn test_header_mismatches() {
        let stored = CacheHeader::new("1.0", Some("20200101".to_string()), None);
        let mut expected = stored.clone();
        assert!(stored.mismatches(&expected).is_empty());

        expected.reader_version = "1.1".to_string();
        expected.data_revision = None;
        let reasons = stored.mismatches(&expected);
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].starts_with("data_revision"));
        assert!(reasons[1].starts_with("reader_version"));
    }
}
